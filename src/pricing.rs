use crate::error::{AppError, AppResult};

/// A line ready for totalling: the unit price snapshot and the quantity.
#[derive(Debug, Clone, Copy)]
pub struct PricedLine {
    pub unit_price: i64,
    pub quantity: i32,
}

impl PricedLine {
    pub fn line_price(&self) -> AppResult<i64> {
        if self.unit_price < 0 {
            return Err(AppError::BadRequest("unit price must not be negative".into()));
        }
        if self.quantity < 0 {
            return Err(AppError::BadRequest("quantity must not be negative".into()));
        }
        self.unit_price
            .checked_mul(self.quantity as i64)
            .ok_or_else(|| AppError::BadRequest("line price overflows".into()))
    }
}

/// Exact total over minor-unit amounts. The single aggregation routine for
/// both order building and display estimates; recomputed on every call.
pub fn compute_total(lines: &[PricedLine]) -> AppResult<i64> {
    let mut total: i64 = 0;
    for line in lines {
        total = total
            .checked_add(line.line_price()?)
            .ok_or_else(|| AppError::BadRequest("order total overflows".into()))?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_totals_zero() {
        assert_eq!(compute_total(&[]).unwrap(), 0);
    }

    #[test]
    fn single_line() {
        let lines = [PricedLine { unit_price: 5000, quantity: 2 }];
        assert_eq!(compute_total(&lines).unwrap(), 10000);
    }

    #[test]
    fn many_lines_sum_exactly() {
        let lines = [
            PricedLine { unit_price: 5000, quantity: 2 },
            PricedLine { unit_price: 3000, quantity: 1 },
        ];
        assert_eq!(compute_total(&lines).unwrap(), 13000);
    }

    #[test]
    fn negative_price_rejected() {
        let lines = [PricedLine { unit_price: -1, quantity: 1 }];
        assert!(matches!(compute_total(&lines), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn negative_quantity_rejected() {
        let lines = [PricedLine { unit_price: 100, quantity: -2 }];
        assert!(matches!(compute_total(&lines), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn overflow_rejected() {
        let lines = [
            PricedLine { unit_price: i64::MAX, quantity: 1 },
            PricedLine { unit_price: 1, quantity: 1 },
        ];
        assert!(matches!(compute_total(&lines), Err(AppError::BadRequest(_))));
    }
}

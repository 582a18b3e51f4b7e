use axum_marketplace_api::{config::AppConfig, db::create_pool};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    sqlx::migrate!("./migrations").run(&pool).await?;

    let buyer_id = ensure_user(&pool, "buyer@example.com", "Test Buyer").await?;
    seed_products(&pool).await?;

    println!("Seed completed. Buyer ID: {buyer_id}");
    Ok(())
}

async fn ensure_user(pool: &sqlx::PgPool, email: &str, name: &str) -> anyhow::Result<Uuid> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, name)
        VALUES ($1, $2, $3)
        ON CONFLICT (email) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(name)
    .fetch_optional(pool)
    .await?;

    // If user already exists, fetch id
    let user_id = match row {
        Some((id,)) => id,
        None => {
            let existing: (Uuid,) = sqlx::query_as("SELECT id FROM users WHERE email = $1")
                .bind(email)
                .fetch_one(pool)
                .await?;
            existing.0
        }
    };

    println!("Ensured user {email}");
    Ok(user_id)
}

async fn seed_products(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let products = vec![
        ("Walnut Desk Organizer", "Handmade walnut tray", 55000_i64),
        ("Ceramic Pour-Over Set", "Two-piece dripper and carafe", 82000),
        ("Linen Tote", "Natural linen, flat bottom", 23000),
        ("Letterpress Card Pack", "Ten assorted cards", 12000),
    ];

    for (name, desc, price) in products {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, price)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(desc)
        .bind(price)
        .execute(pool)
        .await?;
    }

    println!("Seeded products");
    Ok(())
}

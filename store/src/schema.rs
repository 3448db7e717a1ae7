use sqlx::PgPool;

pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
DO $$ BEGIN
    CREATE TYPE seat_status AS ENUM ('AVAILABLE', 'LOCKED', 'SOLD');
EXCEPTION WHEN duplicate_object THEN null;
END $$;
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
DO $$ BEGIN
    CREATE TYPE reservation_status AS ENUM ('PENDING', 'CONFIRMED', 'CANCELLED');
EXCEPTION WHEN duplicate_object THEN null;
END $$;
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
DO $$ BEGIN
    CREATE TYPE payment_method AS ENUM ('CREDIT_CARD', 'DEBIT_CARD', 'PIX', 'CASH');
EXCEPTION WHEN duplicate_object THEN null;
END $$;
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS sessions (
  id TEXT PRIMARY KEY,
  movie_id TEXT NOT NULL,
  room TEXT NOT NULL,
  price NUMERIC(10,2) NOT NULL,
  starts_at TIMESTAMPTZ NOT NULL,
  created_at TIMESTAMPTZ NOT NULL,
  updated_at TIMESTAMPTZ NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    // LOCKED is kept in the enum for schema compatibility but the column
    // itself only ever transitions AVAILABLE -> SOLD; lock ownership lives
    // in the lock store and is overlaid onto seat_status at read time.
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS seats (
  id TEXT PRIMARY KEY,
  session_id TEXT NOT NULL REFERENCES sessions(id),
  seat_row TEXT NOT NULL,
  number INTEGER NOT NULL,
  status seat_status NOT NULL DEFAULT 'AVAILABLE',
  UNIQUE (session_id, seat_row, number)
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS reservations (
  id TEXT PRIMARY KEY,
  user_id TEXT NOT NULL,
  seat_id TEXT NOT NULL REFERENCES seats(id),
  status reservation_status NOT NULL DEFAULT 'PENDING',
  expires_at TIMESTAMPTZ NOT NULL,
  created_at TIMESTAMPTZ NOT NULL,
  updated_at TIMESTAMPTZ NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS sales (
  id TEXT PRIMARY KEY,
  reservation_id TEXT NOT NULL UNIQUE REFERENCES reservations(id),
  amount NUMERIC(10,2) NOT NULL,
  payment_method payment_method NOT NULL,
  created_at TIMESTAMPTZ NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_seats_session ON seats(session_id);"#)
        .execute(pool)
        .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_reservations_seat ON reservations(seat_id);"#)
        .execute(pool)
        .await?;

    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_reservations_status_expires
           ON reservations(status, expires_at);"#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

//! Table definitions, applied idempotently on startup

pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id                UUID PRIMARY KEY,
        email             TEXT NOT NULL UNIQUE,
        full_name         TEXT NOT NULL,
        fiat_balance      NUMERIC(30, 2) NOT NULL DEFAULT 0 CHECK (fiat_balance >= 0),
        secondary_balance NUMERIC(30, 8) NOT NULL DEFAULT 0 CHECK (secondary_balance >= 0),
        currency          TEXT,
        created_at        TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at        TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ledger_entries (
        id             UUID PRIMARY KEY,
        user_id        UUID NOT NULL REFERENCES users(id),
        amount         NUMERIC(30, 8) NOT NULL CHECK (amount > 0),
        entry_type     TEXT NOT NULL,
        status         TEXT NOT NULL,
        currency       TEXT NOT NULL,
        balance_before NUMERIC(30, 8) NOT NULL,
        balance_after  NUMERIC(30, 8) NOT NULL,
        reference      TEXT NOT NULL UNIQUE,
        description    TEXT NOT NULL DEFAULT '',
        metadata       JSONB NOT NULL,
        created_at     TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_ledger_type_created ON ledger_entries (entry_type, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_ledger_user ON ledger_entries (user_id)",
    r#"
    CREATE TABLE IF NOT EXISTS deposit_requests (
        id              UUID PRIMARY KEY,
        user_id         UUID NOT NULL REFERENCES users(id),
        amount          NUMERIC(30, 8) NOT NULL CHECK (amount > 0),
        currency        TEXT NOT NULL,
        method          TEXT,
        proof_reference TEXT,
        status          TEXT NOT NULL,
        admin_note      TEXT,
        created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS withdrawal_requests (
        id          UUID PRIMARY KEY,
        user_id     UUID NOT NULL REFERENCES users(id),
        amount      NUMERIC(30, 8) NOT NULL CHECK (amount > 0),
        fee         NUMERIC(30, 8) NOT NULL DEFAULT 0,
        net_amount  NUMERIC(30, 8) NOT NULL,
        currency    TEXT NOT NULL,
        destination TEXT,
        status      TEXT NOT NULL,
        admin_note  TEXT,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transfer_requests (
        id           UUID PRIMARY KEY,
        user_id      UUID NOT NULL REFERENCES users(id),
        recipient_id UUID NOT NULL REFERENCES users(id),
        amount       NUMERIC(30, 8) NOT NULL CHECK (amount > 0),
        fee          NUMERIC(30, 8) NOT NULL DEFAULT 0,
        total_amount NUMERIC(30, 8) NOT NULL,
        currency     TEXT NOT NULL,
        note         TEXT,
        status       TEXT NOT NULL,
        admin_note   TEXT,
        created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at   TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_deposit_requests_created ON deposit_requests (created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_withdrawal_requests_created ON withdrawal_requests (created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_transfer_requests_created ON transfer_requests (created_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS admin_audit_log (
        id         UUID PRIMARY KEY,
        actor      UUID NOT NULL,
        action     TEXT NOT NULL,
        source     TEXT NOT NULL,
        category   TEXT NOT NULL,
        target_id  UUID NOT NULL,
        before     JSONB NOT NULL,
        after      JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
];

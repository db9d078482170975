//! Table and relation declarations
//!
//! The SQL in `migrations/` materializes these tables. `RELATIONS` mirrors the
//! foreign keys declared there and is checked against the live schema on
//! connect, so the two cannot drift apart silently.

use sqlx::{Pool, Sqlite};

use crate::error::AppError;

/// Every table owned by this service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Users,
    Accounts,
    Sessions,
    VerificationTokens,
    Authenticators,
    Companies,
    CompanyUsers,
}

impl Table {
    pub const ALL: [Table; 7] = [
        Table::Users,
        Table::Accounts,
        Table::Sessions,
        Table::VerificationTokens,
        Table::Authenticators,
        Table::Companies,
        Table::CompanyUsers,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Accounts => "accounts",
            Self::Sessions => "sessions",
            Self::VerificationTokens => "verification_tokens",
            Self::Authenticators => "authenticators",
            Self::Companies => "companies",
            Self::CompanyUsers => "company_users",
        }
    }
}

/// Referential action applied to children when the parent row is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    Cascade,
}

impl OnDelete {
    fn as_sql(&self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
        }
    }
}

/// A many-to-one foreign key: `child.column -> parent.parent_column`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    pub child: Table,
    pub column: &'static str,
    pub parent: Table,
    pub parent_column: &'static str,
    pub on_delete: OnDelete,
}

pub const RELATIONS: &[Relation] = &[
    Relation {
        child: Table::Accounts,
        column: "user_id",
        parent: Table::Users,
        parent_column: "id",
        on_delete: OnDelete::Cascade,
    },
    Relation {
        child: Table::Sessions,
        column: "user_id",
        parent: Table::Users,
        parent_column: "id",
        on_delete: OnDelete::Cascade,
    },
    Relation {
        child: Table::Authenticators,
        column: "user_id",
        parent: Table::Users,
        parent_column: "id",
        on_delete: OnDelete::Cascade,
    },
    Relation {
        child: Table::CompanyUsers,
        column: "user_id",
        parent: Table::Users,
        parent_column: "id",
        on_delete: OnDelete::Cascade,
    },
    Relation {
        child: Table::CompanyUsers,
        column: "company_id",
        parent: Table::Companies,
        parent_column: "id",
        on_delete: OnDelete::Cascade,
    },
];

/// Relations whose parent is `table` (the "many" side of `table`)
pub fn children_of(table: Table) -> impl Iterator<Item = &'static Relation> {
    RELATIONS.iter().filter(move |r| r.parent == table)
}

/// Relations whose child is `table` (the "one" side from `table`)
pub fn parents_of(table: Table) -> impl Iterator<Item = &'static Relation> {
    RELATIONS.iter().filter(move |r| r.child == table)
}

#[derive(Debug, sqlx::FromRow)]
struct ForeignKeyRow {
    table: String,
    from: String,
    to: String,
    on_delete: String,
}

/// Compare the declared relations with the foreign keys SQLite reports.
///
/// # Errors
/// Returns `AppError::Config` naming the first relation that is missing or
/// has a different delete action.
pub async fn verify(pool: &Pool<Sqlite>) -> Result<(), AppError> {
    for table in Table::ALL {
        let declared: Vec<&Relation> = parents_of(table).collect();
        let actual = sqlx::query_as::<_, ForeignKeyRow>(&format!(
            "SELECT \"table\", \"from\", \"to\", on_delete FROM pragma_foreign_key_list('{}')",
            table.name()
        ))
        .fetch_all(pool)
        .await?;

        for relation in &declared {
            let matched = actual.iter().any(|fk| {
                fk.table == relation.parent.name()
                    && fk.from == relation.column
                    && fk.to == relation.parent_column
                    && fk.on_delete.eq_ignore_ascii_case(relation.on_delete.as_sql())
            });
            if !matched {
                return Err(AppError::Config(format!(
                    "schema is missing foreign key {}.{} -> {}.{} ON DELETE {}",
                    table.name(),
                    relation.column,
                    relation.parent.name(),
                    relation.parent_column,
                    relation.on_delete.as_sql()
                )));
            }
        }

        if actual.len() != declared.len() {
            return Err(AppError::Config(format!(
                "table {} has {} foreign keys, {} declared",
                table.name(),
                actual.len(),
                declared.len()
            )));
        }
    }

    tracing::debug!(relations = RELATIONS.len(), "Schema relations verified");
    Ok(())
}

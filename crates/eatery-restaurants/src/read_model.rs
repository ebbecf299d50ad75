//! The mall read model: a flat list of every restaurant and its current name.

use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eatery_core::error::DomainError;
use eatery_core::read_model::{ReadModelRepository, ReadModelRow};
use eatery_event_store::error::map_sqlx_error;
use eatery_event_store::schema::Schema;
use eatery_event_store::transaction::PgScope;
use serde::Serialize;
use sqlx::Row;
use tracing::instrument;
use uuid::Uuid;

/// One row of the mall listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MallRestaurant {
    /// The restaurant identifier.
    pub id: Uuid,
    /// Current display name.
    pub name: String,
    /// When the row last changed.
    pub updated_at: DateTime<Utc>,
}

impl ReadModelRow for MallRestaurant {
    const TABLE: &'static str = "mall_restaurants";

    fn row_id(&self) -> Uuid {
        self.id
    }

    fn listing_order(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name).then(self.id.cmp(&other.id))
    }
}

/// Storage of the mall read model.
pub type MallRepository = dyn ReadModelRepository<MallRestaurant>;

/// PostgreSQL-backed mall repository.
#[derive(Debug, Clone)]
pub struct PgMallRepository {
    scope: PgScope,
    table: String,
}

impl PgMallRepository {
    /// Creates a repository writing through `scope`.
    #[must_use]
    pub fn new(scope: impl Into<PgScope>, schema: Schema) -> Self {
        Self {
            scope: scope.into(),
            table: format!("{}.{}", schema.name(), MallRestaurant::TABLE),
        }
    }
}

#[async_trait]
impl ReadModelRepository<MallRestaurant> for PgMallRepository {
    #[instrument(skip_all, fields(restaurant_id = %row.id), err)]
    async fn upsert(&self, row: &MallRestaurant) -> Result<(), DomainError> {
        let sql = format!(
            "INSERT INTO {} (id, name, updated_at) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, updated_at = EXCLUDED.updated_at",
            self.table
        );
        self.scope
            .execute(
                sqlx::query(&sql)
                    .bind(row.id)
                    .bind(&row.name)
                    .bind(row.updated_at),
            )
            .await
            .map_err(|e| map_sqlx_error("mall_upsert", e))?;
        Ok(())
    }

    #[instrument(skip_all, err)]
    async fn list(&self) -> Result<Vec<MallRestaurant>, DomainError> {
        let sql = format!(
            "SELECT id, name, updated_at FROM {} ORDER BY name, id",
            self.table
        );
        let rows = self
            .scope
            .fetch_all(sqlx::query(&sql))
            .await
            .map_err(|e| map_sqlx_error("mall_list", e))?;
        rows.iter()
            .map(|row| {
                Ok::<_, sqlx::Error>(MallRestaurant {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    updated_at: row.try_get("updated_at")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("mall_list", e))
    }
}

#[cfg(test)]
mod tests {
    use eatery_test_support::FixedClock;

    use super::*;

    fn row(name: &str) -> MallRestaurant {
        MallRestaurant {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            updated_at: FixedClock::default().0,
        }
    }

    #[test]
    fn test_listing_order_is_by_name_then_id() {
        // Arrange
        let mut rows = vec![row("Zest"), row("Bistro"), row("Bistro")];

        // Act
        rows.sort_by(MallRestaurant::listing_order);

        // Assert
        assert_eq!(rows[0].name, "Bistro");
        assert_eq!(rows[1].name, "Bistro");
        assert!(rows[0].id < rows[1].id);
        assert_eq!(rows[2].name, "Zest");
    }
}

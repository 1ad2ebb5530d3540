//! City registry queries.

use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};

use super::{page_offset, CityRegistry, PgStore, StoreError};
use crate::models::{City, CityInput};

// ---

/// Optional filters for city listing.
#[derive(Debug, Clone, Default)]
pub struct CityFilter {
    // ---
    /// Case-insensitive substring of the city name.
    pub q: Option<String>,
    /// Exact province match.
    pub province: Option<String>,
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &CityFilter) {
    // ---
    let mut sep = " WHERE ";
    if let Some(q) = filter.q.as_deref().filter(|q| !q.is_empty()) {
        qb.push(sep).push("name ILIKE ").push_bind(format!("%{q}%"));
        sep = " AND ";
    }
    if let Some(province) = filter.province.as_deref().filter(|p| !p.is_empty()) {
        qb.push(sep).push("province = ").push_bind(province.to_string());
    }
}

impl PgStore {
    // ---
    pub async fn search_cities(
        &self,
        filter: &CityFilter,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<City>, i64), StoreError> {
        // ---
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM cities");
        push_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT id, name, province, lat, lon FROM cities");
        push_filter(&mut select, filter);
        select
            .push(" ORDER BY name, id LIMIT ")
            .push_bind(i64::from(page_size))
            .push(" OFFSET ")
            .push_bind(page_offset(page, page_size));

        let items = select.build_query_as::<City>().fetch_all(&self.pool).await?;
        Ok((items, total))
    }

    pub async fn get_city(&self, id: i64) -> Result<Option<City>, StoreError> {
        // ---
        let city = sqlx::query_as::<_, City>("SELECT id, name, province, lat, lon FROM cities WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(city)
    }

    /// Insert a city. `name` must already be validated as present.
    pub async fn create_city(&self, name: &str, input: &CityInput) -> Result<City, StoreError> {
        // ---
        let city = sqlx::query_as::<_, City>(
            r#"
            INSERT INTO cities (name, province, lat, lon)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, province, lat, lon
            "#,
        )
        .bind(name)
        .bind(&input.province)
        .bind(input.lat)
        .bind(input.lon)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(city_id = city.id, name = %city.name, "city created");
        Ok(city)
    }

    /// Apply the fields present in `input`; `None` when the city does not exist.
    pub async fn update_city(&self, id: i64, input: &CityInput) -> Result<Option<City>, StoreError> {
        // ---
        let city = sqlx::query_as::<_, City>(
            r#"
            UPDATE cities SET
                name     = COALESCE($2, name),
                province = COALESCE($3, province),
                lat      = COALESCE($4, lat),
                lon      = COALESCE($5, lon)
            WHERE id = $1
            RETURNING id, name, province, lat, lon
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.province)
        .bind(input.lat)
        .bind(input.lon)
        .fetch_optional(&self.pool)
        .await?;
        Ok(city)
    }

    /// Delete a city, leaving its readings in place. Returns whether a row went away.
    pub async fn delete_city(&self, id: i64) -> Result<bool, StoreError> {
        // ---
        let result = sqlx::query("DELETE FROM cities WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            tracing::info!(city_id = id, "city deleted");
        }
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CityRegistry for PgStore {
    async fn list_cities(&self, page: u32, page_size: u32) -> Result<(Vec<City>, i64), StoreError> {
        self.search_cities(&CityFilter::default(), page, page_size).await
    }
}

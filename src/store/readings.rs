//! Air-quality reading persistence and read-side queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};

use super::{page_offset, PgStore, ReadingStore, StoreError};
use crate::models::{AqiLevel, MonthlyStat, NormalizedReading, Reading};

// ---

const READING_COLUMNS: &str = "id, city_id, recorded_time, aqi, aqi_level, dominant_pollutant, \
     pm25, pm10, o3, no2, so2, co, source, attribution";

fn push_range(
    qb: &mut QueryBuilder<'_, Postgres>,
    city_id: i64,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) {
    // ---
    qb.push(" WHERE city_id = ").push_bind(city_id);
    if let Some(start) = start {
        qb.push(" AND recorded_time >= ").push_bind(start);
    }
    if let Some(end) = end {
        qb.push(" AND recorded_time <= ").push_bind(end);
    }
}

impl PgStore {
    // ---
    /// Readings for one city, newest first.
    pub async fn query_readings(
        &self,
        city_id: i64,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<Reading>, i64), StoreError> {
        // ---
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM air_quality_data");
        push_range(&mut count, city_id, start, end);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {READING_COLUMNS} FROM air_quality_data"
        ));
        push_range(&mut select, city_id, start, end);
        select
            .push(" ORDER BY recorded_time DESC LIMIT ")
            .push_bind(i64::from(page_size))
            .push(" OFFSET ")
            .push_bind(page_offset(page, page_size));

        let items = select.build_query_as::<Reading>().fetch_all(&self.pool).await?;
        Ok((items, total))
    }

    pub async fn latest_reading(&self, city_id: i64) -> Result<Option<Reading>, StoreError> {
        // ---
        let reading = sqlx::query_as::<_, Reading>(&format!(
            "SELECT {READING_COLUMNS} FROM air_quality_data \
             WHERE city_id = $1 ORDER BY recorded_time DESC LIMIT 1"
        ))
        .bind(city_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(reading)
    }

    /// Per-month share of Excellent/Good readings and mean PM2.5, newest month first.
    pub async fn monthly_stats(&self, city_id: i64, months: u32) -> Result<Vec<MonthlyStat>, StoreError> {
        // ---
        let rows: Vec<(String, f64, Option<f64>)> = sqlx::query_as(
            r#"
            SELECT
                TO_CHAR(DATE_TRUNC('month', recorded_time), 'YYYY-MM') AS month,
                COALESCE(
                    COUNT(*) FILTER (WHERE aqi_level IN ($2, $3))::FLOAT8 / NULLIF(COUNT(*), 0),
                    0
                ) AS good_ratio,
                AVG(pm25) AS pm25_avg
            FROM air_quality_data
            WHERE city_id = $1
            GROUP BY DATE_TRUNC('month', recorded_time)
            ORDER BY DATE_TRUNC('month', recorded_time) DESC
            LIMIT $4
            "#,
        )
        .bind(city_id)
        .bind(AqiLevel::Excellent.as_str())
        .bind(AqiLevel::Good.as_str())
        .bind(i64::from(months))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(month, good_ratio, pm25_avg)| MonthlyStat {
                month,
                good_ratio,
                pm25_avg,
            })
            .collect())
    }
}

#[async_trait]
impl ReadingStore for PgStore {
    async fn upsert_reading(
        &self,
        city_id: i64,
        reading: &NormalizedReading,
        source: &str,
    ) -> Result<i64, StoreError> {
        // ---
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO air_quality_data (
                city_id, recorded_time, aqi, aqi_level, dominant_pollutant,
                pm25, pm10, o3, no2, so2, co, source, attribution
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (city_id, recorded_time) DO UPDATE SET
                aqi                = EXCLUDED.aqi,
                aqi_level          = EXCLUDED.aqi_level,
                dominant_pollutant = EXCLUDED.dominant_pollutant,
                pm25               = EXCLUDED.pm25,
                pm10               = EXCLUDED.pm10,
                o3                 = EXCLUDED.o3,
                no2                = EXCLUDED.no2,
                so2                = EXCLUDED.so2,
                co                 = EXCLUDED.co,
                source             = EXCLUDED.source,
                attribution        = EXCLUDED.attribution
            RETURNING id
            "#,
        )
        .bind(city_id)
        .bind(reading.recorded_time)
        .bind(reading.aqi)
        .bind(reading.aqi_level.map(|level| level.as_str()))
        .bind(&reading.dominant_pollutant)
        .bind(reading.pollutants.pm25)
        .bind(reading.pollutants.pm10)
        .bind(reading.pollutants.o3)
        .bind(reading.pollutants.no2)
        .bind(reading.pollutants.so2)
        .bind(reading.pollutants.co)
        .bind(source)
        .bind(&reading.attribution)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }
}

use super::{
    ColumnInfo, FeatureQuery, FeatureRow, IntersectionQuery, IntersectionRow, SpatialStore,
    StoreError,
};
use crate::analysis::{Identifier, SqlParam, Srid};
use crate::config::DatabaseConfig;
use postgres::types::ToSql;
use postgres::NoTls;
use r2d2::{Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;
use tracing::debug;

type Manager = PostgresConnectionManager<NoTls>;

/// [`SpatialStore`] backed by PostGIS.
///
/// Every call checks out its own pooled connection, so concurrent analyses
/// never share a session.
pub struct PostgisStore {
    pool: Option<Pool<Manager>>,
    schema: Identifier,
}

impl Drop for PostgisStore {
    fn drop(&mut self) {
        // The synchronous client must not be torn down on an async worker.
        if let Some(pool) = self.pool.take() {
            let _ = std::thread::spawn(move || drop(pool));
        }
    }
}

impl PostgisStore {
    /// Builds the connection pool. Connections are opened on first use.
    pub fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let schema = Identifier::parse(&config.schema)
            .map_err(|err| StoreError::Connection(err.to_string()))?;

        let mut pg_config = postgres::Config::new();
        pg_config
            .host(&config.host)
            .port(config.port)
            .dbname(&config.name)
            .user(&config.user)
            .password(&config.password)
            .connect_timeout(config.connect_timeout());
        let options = format!("-c statement_timeout={}", config.statement_timeout_ms);
        pg_config.options(&options);

        let manager = PostgresConnectionManager::new(pg_config, NoTls);
        let pool = Pool::builder()
            .max_size(config.max_connections.max(1))
            .min_idle(Some(0))
            .connection_timeout(config.connect_timeout())
            .build(manager)
            .map_err(|err| StoreError::Connection(err.to_string()))?;

        Ok(Self {
            pool: Some(pool),
            schema,
        })
    }

    fn conn(&self) -> Result<PooledConnection<Manager>, StoreError> {
        self.pool
            .as_ref()
            .ok_or_else(|| StoreError::Connection("spatial store closed".to_string()))?
            .get()
            .map_err(|err| StoreError::Connection(err.to_string()))
    }
}

fn bind(param: &SqlParam) -> &(dyn ToSql + Sync) {
    match param {
        SqlParam::Text(value) => value,
        SqlParam::Int(value) => value,
    }
}

fn query_error(err: postgres::Error) -> StoreError {
    StoreError::Query(err.to_string())
}

fn decode_error(err: postgres::Error) -> StoreError {
    StoreError::Decode(err.to_string())
}

/// Intersection query for one dataset. The input geometry is materialised
/// once in the `input` CTE and referenced for the dimension test, the
/// measurement and the predicate.
pub(crate) fn intersection_sql(
    schema: &Identifier,
    query: &IntersectionQuery<'_>,
) -> (String, Vec<SqlParam>) {
    let (input_sql, params) = query.input.render(1);
    let geom = format!("t.{}", query.geometry_column.quoted());
    let class = format!("t.{}", query.classification_column.quoted());

    let sql = format!(
        "WITH input AS (SELECT {input_sql} AS g) \
         SELECT {class}::text AS classification, \
                ST_Dimension(input.g) AS input_dimension, \
                CASE WHEN ST_Dimension(input.g) = 2 \
                     THEN ST_Area(ST_Intersection({geom}, input.g)) ELSE 0 END AS intersect_area, \
                CASE WHEN ST_Dimension(input.g) = 1 \
                     THEN ST_Length(ST_Intersection({geom}, input.g)) ELSE 0 END AS intersect_length \
         FROM {schema}.{table} AS t CROSS JOIN input \
         WHERE ST_Intersects({geom}, input.g)",
        schema = schema.quoted(),
        table = query.table.quoted(),
    );

    (sql, params)
}

/// Hazard polygons intersecting the input, exported as EPSG:4326 GeoJSON
/// with six decimals. The row limit is the last bound parameter.
pub(crate) fn features_sql(
    schema: &Identifier,
    query: &FeatureQuery<'_>,
) -> (String, Vec<SqlParam>) {
    let (input_sql, mut params) = query.input.render(1);
    let geom = format!("t.{}", query.geometry_column.quoted());
    let class = format!("t.{}", query.classification_column.quoted());
    params.push(SqlParam::Int(query.limit));

    let sql = format!(
        "WITH input AS (SELECT {input_sql} AS g) \
         SELECT ST_AsGeoJSON(ST_Transform({geom}, 4326), 6) AS geojson, \
                {class}::text AS classification \
         FROM {schema}.{table} AS t CROSS JOIN input \
         WHERE ST_Intersects({geom}, input.g) \
         LIMIT ${limit}::integer",
        schema = schema.quoted(),
        table = query.table.quoted(),
        limit = params.len(),
    );

    (sql, params)
}

pub(crate) fn sample_srid_sql(
    schema: &Identifier,
    table: &Identifier,
    geometry_column: &Identifier,
) -> String {
    let geom = geometry_column.quoted();
    format!(
        "SELECT ST_SRID({geom}) FROM {}.{} WHERE {geom} IS NOT NULL LIMIT 1",
        schema.quoted(),
        table.quoted()
    )
}

impl SpatialStore for PostgisStore {
    fn registered_geometry_column(
        &self,
        table: &Identifier,
    ) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn()?;
        let row = conn
            .query_opt(
                "SELECT f_geometry_column::text FROM public.geometry_columns \
                 WHERE f_table_schema::text = $1 AND f_table_name::text = $2 LIMIT 1",
                &[&self.schema.as_str(), &table.as_str()],
            )
            .map_err(query_error)?;

        match row {
            Some(row) => row.try_get::<_, Option<String>>(0).map_err(decode_error),
            None => Ok(None),
        }
    }

    fn columns(&self, table: &Identifier) -> Result<Vec<ColumnInfo>, StoreError> {
        let mut conn = self.conn()?;
        let rows = conn
            .query(
                "SELECT column_name::text, udt_name::text FROM information_schema.columns \
                 WHERE table_schema::text = $1 AND table_name::text = $2 \
                 ORDER BY ordinal_position",
                &[&self.schema.as_str(), &table.as_str()],
            )
            .map_err(query_error)?;

        rows.iter()
            .map(|row| {
                let name: String = row.try_get(0).map_err(decode_error)?;
                let udt_name: Option<String> = row.try_get(1).map_err(decode_error)?;
                Ok(ColumnInfo::new(name, udt_name.unwrap_or_default()))
            })
            .collect()
    }

    fn table_exists(&self, table: &Identifier) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        let row = conn
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
                 WHERE table_schema::text = $1 AND table_name::text = $2)",
                &[&self.schema.as_str(), &table.as_str()],
            )
            .map_err(query_error)?;
        row.try_get(0).map_err(decode_error)
    }

    fn registered_tables_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn()?;
        let rows = conn
            .query(
                "SELECT f_table_name::text FROM public.geometry_columns \
                 WHERE f_table_schema::text = $1 \
                   AND left(f_table_name::text, char_length($2::text)) = $2::text \
                 ORDER BY f_table_name",
                &[&self.schema.as_str(), &prefix],
            )
            .map_err(query_error)?;

        let mut tables = rows
            .iter()
            .map(|row| row.try_get::<_, String>(0).map_err(decode_error))
            .collect::<Result<Vec<_>, _>>()?;
        tables.dedup();
        Ok(tables)
    }

    fn sample_srid(
        &self,
        table: &Identifier,
        geometry_column: &Identifier,
    ) -> Result<Option<Srid>, StoreError> {
        let mut conn = self.conn()?;
        let sql = sample_srid_sql(&self.schema, table, geometry_column);
        let row = conn.query_opt(sql.as_str(), &[]).map_err(query_error)?;

        match row {
            Some(row) => row.try_get::<_, Option<i32>>(0).map_err(decode_error),
            None => Ok(None),
        }
    }

    fn intersect(&self, query: &IntersectionQuery<'_>) -> Result<Vec<IntersectionRow>, StoreError> {
        let (sql, params) = intersection_sql(&self.schema, query);
        let bound: Vec<&(dyn ToSql + Sync)> = params.iter().map(bind).collect();

        debug!(
            table = %query.table,
            reprojected = query.input.is_reprojected(),
            srid = query.input.srid(),
            "running intersection query"
        );

        let mut conn = self.conn()?;
        let rows = conn.query(sql.as_str(), &bound).map_err(query_error)?;

        rows.iter()
            .map(|row| {
                Ok(IntersectionRow {
                    classification: row.try_get(0).map_err(decode_error)?,
                    input_dimension: row.try_get(1).map_err(decode_error)?,
                    intersect_area: row.try_get(2).map_err(decode_error)?,
                    intersect_length: row.try_get(3).map_err(decode_error)?,
                })
            })
            .collect()
    }

    fn intersecting_features(&self, query: &FeatureQuery<'_>) -> Result<Vec<FeatureRow>, StoreError> {
        let (sql, params) = features_sql(&self.schema, query);
        let bound: Vec<&(dyn ToSql + Sync)> = params.iter().map(bind).collect();

        debug!(table = %query.table, limit = query.limit, "exporting intersecting features");

        let mut conn = self.conn()?;
        let rows = conn.query(sql.as_str(), &bound).map_err(query_error)?;

        rows.iter()
            .map(|row| {
                Ok(FeatureRow {
                    geojson: row.try_get(0).map_err(decode_error)?,
                    classification: row.try_get(1).map_err(decode_error)?,
                })
            })
            .collect()
    }
}

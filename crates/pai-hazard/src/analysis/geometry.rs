use super::AnalysisError;
use serde::Serialize;
use serde_json::Value;

/// Spatial reference authority code. `0` means unknown.
pub type Srid = i32;

/// Coordinates of every incoming geometry are longitude/latitude (WGS 84).
pub const INPUT_SRID: Srid = 4326;

/// GeoJSON geometry types accepted as analysis input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GeometryKind {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
}

impl GeometryKind {
    fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "Point" => Some(Self::Point),
            "MultiPoint" => Some(Self::MultiPoint),
            "LineString" => Some(Self::LineString),
            "MultiLineString" => Some(Self::MultiLineString),
            "Polygon" => Some(Self::Polygon),
            "MultiPolygon" => Some(Self::MultiPolygon),
            _ => None,
        }
    }

    /// Topological dimension: points 0, lines 1, polygons 2.
    pub fn dimension(self) -> i32 {
        match self {
            Self::Point | Self::MultiPoint => 0,
            Self::LineString | Self::MultiLineString => 1,
            Self::Polygon | Self::MultiPolygon => 2,
        }
    }
}

/// A structurally checked GeoJSON geometry in [`INPUT_SRID`].
#[derive(Debug, Clone, PartialEq)]
pub struct InputGeometry {
    kind: GeometryKind,
    geojson: String,
}

impl InputGeometry {
    /// Accepts an object with a recognised `type` and an array `coordinates`.
    pub fn from_value(value: &Value) -> Result<Self, AnalysisError> {
        let object = value.as_object().ok_or_else(|| {
            AnalysisError::Input("'geometry' must be a GeoJSON geometry object".to_string())
        })?;

        let type_name = object
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| AnalysisError::Input("'geometry' is missing its type".to_string()))?;

        let kind = GeometryKind::from_type_name(type_name).ok_or_else(|| {
            AnalysisError::Input(format!("unsupported geometry type '{type_name}'"))
        })?;

        match object.get("coordinates") {
            Some(Value::Array(_)) => {}
            _ => {
                return Err(AnalysisError::Input(
                    "'geometry' has no coordinate payload".to_string(),
                ))
            }
        }

        Ok(Self {
            kind,
            geojson: value.to_string(),
        })
    }

    pub fn kind(&self) -> GeometryKind {
        self.kind
    }

    pub fn as_geojson(&self) -> &str {
        &self.geojson
    }
}

/// Literal value bound to a query placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Int(i32),
}

/// Query-side expression for the input geometry in a dataset's CRS.
///
/// The expression is rendered once and referenced by name inside the
/// intersection query, so the GeoJSON text is parsed by the store only once
/// per dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryExpr {
    geojson: String,
    dimension: i32,
    source_srid: Srid,
    target_srid: Option<Srid>,
}

/// Tags the input with [`INPUT_SRID`] and reprojects it to `target_crs` when
/// that is known and different.
pub fn to_dataset_crs(input: &InputGeometry, target_crs: Srid) -> GeometryExpr {
    let target_srid = if target_crs == 0 || target_crs == INPUT_SRID {
        None
    } else {
        Some(target_crs)
    };

    GeometryExpr {
        geojson: input.as_geojson().to_string(),
        dimension: input.kind().dimension(),
        source_srid: INPUT_SRID,
        target_srid,
    }
}

impl GeometryExpr {
    pub fn is_reprojected(&self) -> bool {
        self.target_srid.is_some()
    }

    /// CRS of the geometry the expression evaluates to.
    pub fn srid(&self) -> Srid {
        self.target_srid.unwrap_or(self.source_srid)
    }

    /// Dimension of the parsed input; reprojection never changes it.
    pub fn dimension(&self) -> i32 {
        self.dimension
    }

    /// Renders the expression using placeholders numbered from `first_param`.
    pub fn render(&self, first_param: usize) -> (String, Vec<SqlParam>) {
        let tagged = format!(
            "ST_SetSRID(ST_GeomFromGeoJSON(${}::text), ${}::integer)",
            first_param,
            first_param + 1
        );
        let mut params = vec![
            SqlParam::Text(self.geojson.clone()),
            SqlParam::Int(self.source_srid),
        ];

        match self.target_srid {
            Some(target) => {
                params.push(SqlParam::Int(target));
                (
                    format!("ST_Transform({tagged}, ${}::integer)", first_param + 2),
                    params,
                )
            }
            None => (tagged, params),
        }
    }
}

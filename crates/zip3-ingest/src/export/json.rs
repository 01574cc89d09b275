//! GeoJSON output (RFC 7946: always WGS84 longitude/latitude)

use super::{FIELD_STATE, FIELD_ZIP3};
use crate::crs::{reproject, Crs};
use crate::models::Zip3Region;
use geojson::{Feature, FeatureCollection, JsonObject};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use zip3_common::{Result, Zip3Error};

pub struct GeoJsonWriter;

impl GeoJsonWriter {
    pub fn write(path: &Path, regions: &[Zip3Region], crs: Crs) -> Result<()> {
        let features = regions
            .iter()
            .map(|region| {
                let wgs84 = reproject(&region.geometry.as_multi(), crs, Crs::Wgs84);
                let mut properties = JsonObject::new();
                properties.insert(FIELD_STATE.to_string(), region.state_abbr().into());
                properties.insert(FIELD_ZIP3.to_string(), region.zip3().into());
                Feature {
                    bbox: None,
                    geometry: Some(geojson::Geometry::new(geojson::Value::from(&wgs84))),
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();

        let collection = FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        };

        let file = File::create(path).map_err(|e| Zip3Error::write(path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &collection)?;
        writer.flush().map_err(|e| Zip3Error::write(path, e))?;
        Ok(())
    }
}

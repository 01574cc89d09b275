//! ESRI Shapefile output (`.shp`, `.shx`, `.dbf` and a `.prj`)

use super::{FIELD_STATE, FIELD_ZIP3};
use crate::crs::Crs;
use crate::models::Zip3Region;
use shapefile::dbase::{FieldName, FieldValue, Record, TableWriterBuilder};
use std::path::Path;
use zip3_common::{Result, Zip3Error};

pub struct ShapefileWriter;

impl ShapefileWriter {
    pub fn write(path: &Path, regions: &[Zip3Region], crs: Crs) -> Result<()> {
        let field = |name: &str| FieldName::try_from(name).map_err(|e| Zip3Error::write(path, format!("{:?}", e)));
        let table = TableWriterBuilder::new()
            .add_character_field(field(FIELD_STATE)?, 2)
            .add_character_field(field(FIELD_ZIP3)?, 3);

        {
            let mut writer =
                shapefile::Writer::from_path(path, table).map_err(|e| Zip3Error::write(path, e))?;

            for region in regions {
                let polygon = shapefile::Polygon::from(region.geometry.as_multi().into_owned());
                let mut record = Record::default();
                record.insert(
                    FIELD_STATE.to_string(),
                    FieldValue::Character(Some(region.state_abbr().to_string())),
                );
                record.insert(
                    FIELD_ZIP3.to_string(),
                    FieldValue::Character(Some(region.zip3().to_string())),
                );
                writer
                    .write_shape_and_record(&polygon, &record)
                    .map_err(|e| Zip3Error::write(path, e))?;
            }
            // Headers are finalized when the writer drops
        }

        let prj = path.with_extension("prj");
        std::fs::write(&prj, crs.wkt()).map_err(|e| Zip3Error::write(&prj, e))?;
        Ok(())
    }

    /// Every file making up the shapefile at `path`
    pub fn sidecars(path: &Path) -> Vec<std::path::PathBuf> {
        ["shp", "shx", "dbf", "prj"]
            .iter()
            .map(|ext| path.with_extension(ext))
            .collect()
    }
}

//! Heuristic point CSV

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::engine::SignaturePoint;
use crate::{Result, RsdError};

/// Write `lat_deg,lon_deg` rows to `path`. Returns the number of points written.
pub fn write_signature_csv(
    path: impl AsRef<Path>,
    points: impl IntoIterator<Item = SignaturePoint>,
) -> Result<u64> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| RsdError::output_error(path.to_path_buf(), e))?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(file));
    writer.write_record(["lat_deg", "lon_deg"])?;

    let mut written = 0;
    for point in points {
        writer.write_record([format!("{:.8}", point.lat_deg), format!("{:.8}", point.lon_deg)])?;
        written += 1;
    }
    writer.flush().map_err(|e| RsdError::output_error(path.to_path_buf(), e))?;
    Ok(written)
}

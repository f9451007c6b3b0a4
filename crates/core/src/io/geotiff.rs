//! GeoTIFF reading/writing on top of the `tiff` crate
//!
//! Supports north-up grids described by ModelPixelScale + ModelTiepoint,
//! an EPSG code in the GeoKey directory, and the GDAL nodata tag.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster};
use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;

/// Read the first band of a GeoTIFF as `f64`.
///
/// Pixels equal to the file's nodata value become NaN, and the returned
/// raster uses NaN as its nodata marker.
pub fn read_band<P: AsRef<Path>>(path: P) -> Result<Raster<f64>> {
    let file = File::open(path.as_ref())?;
    decode(file)
}

/// Same as [`read_band`] for an in-memory buffer
pub fn read_band_from_buffer(data: &[u8]) -> Result<Raster<f64>> {
    decode(Cursor::new(data))
}

/// Write a raster as a single-band 32-bit float GeoTIFF
pub fn write_band<P: AsRef<Path>>(raster: &Raster<f64>, path: P) -> Result<()> {
    let file = File::create(path.as_ref())?;
    encode(raster, file)
}

/// Same as [`write_band`] into an in-memory buffer
pub fn write_band_to_buffer(raster: &Raster<f64>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode(raster, Cursor::new(&mut buf))?;
    Ok(buf)
}

fn tiff_err(context: &str) -> impl Fn(tiff::TiffError) -> Error + '_ {
    move |e| Error::Other(format!("{}: {}", context, e))
}

fn widen<T: Copy + Into<f64>>(buf: Vec<T>) -> Vec<f64> {
    buf.into_iter().map(Into::into).collect()
}

fn decode<R: Read + Seek>(reader: R) -> Result<Raster<f64>> {
    let mut decoder = Decoder::new(reader).map_err(tiff_err("TIFF decode error"))?;
    let (width, height) = decoder
        .dimensions()
        .map_err(tiff_err("Cannot read dimensions"))?;
    let (rows, cols) = (height as usize, width as usize);

    let values = match decoder
        .read_image()
        .map_err(tiff_err("Cannot read image data"))?
    {
        DecodingResult::U8(buf) => widen(buf),
        DecodingResult::U16(buf) => widen(buf),
        DecodingResult::U32(buf) => widen(buf),
        DecodingResult::I8(buf) => widen(buf),
        DecodingResult::I16(buf) => widen(buf),
        DecodingResult::I32(buf) => widen(buf),
        DecodingResult::F32(buf) => widen(buf),
        DecodingResult::F64(buf) => buf,
        _ => {
            return Err(Error::UnsupportedDataType(
                "Unsupported TIFF pixel format".to_string(),
            ))
        }
    };

    // Multi-sample images decode interleaved; keep only the first sample.
    let samples = values.len() / (rows * cols).max(1);
    let mut values: Vec<f64> = if samples > 1 {
        values.into_iter().step_by(samples).collect()
    } else {
        values
    };
    if values.len() != rows * cols {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    if let Some(nodata) = read_nodata(&mut decoder) {
        for v in values.iter_mut() {
            if *v == nodata {
                *v = f64::NAN;
            }
        }
    }

    let mut raster = Raster::from_vec(values, rows, cols)?;
    raster.set_nodata(Some(f64::NAN));
    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    raster.set_crs(read_epsg(&mut decoder).map(CRS::from_epsg));
    Ok(raster)
}

fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder
        .get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE))
        .ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TIEPOINT)).ok()?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

fn read_epsg<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<u32> {
    let keys = decoder
        .get_tag_u16_vec(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY))
        .ok()?;
    // Header is 4 shorts, then (key, location, count, value) entries.
    keys.get(4..)?
        .chunks_exact(4)
        .find(|e| {
            (e[0] == PROJECTED_CS_TYPE_KEY || e[0] == GEOGRAPHIC_TYPE_KEY) && e[1] == 0
        })
        .map(|e| u32::from(e[3]))
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    let text = decoder
        .get_tag_ascii_string(Tag::from_u16_exhaustive(GDAL_NODATA))
        .ok()?;
    text.trim_matches(char::from(0)).trim().parse().ok()
}

fn geo_keys(crs: Option<&CRS>) -> Vec<u16> {
    let epsg = crs
        .and_then(CRS::epsg)
        .and_then(|code| u16::try_from(code).ok());
    let geographic = crs.is_some_and(CRS::is_geographic);
    let model_type = if geographic { 2 } else { 1 };

    let mut entries = vec![
        [GT_MODEL_TYPE_KEY, 0, 1, model_type],
        // RasterPixelIsArea
        [GT_RASTER_TYPE_KEY, 0, 1, 1],
    ];
    if let Some(code) = epsg {
        let key = if geographic {
            GEOGRAPHIC_TYPE_KEY
        } else {
            PROJECTED_CS_TYPE_KEY
        };
        entries.push([key, 0, 1, code]);
    }

    let mut keys = vec![1, 1, 0, entries.len() as u16];
    keys.extend(entries.into_iter().flatten());
    keys
}

fn encode<W: Write + Seek>(raster: &Raster<f64>, writer: W) -> Result<()> {
    let mut encoder = TiffEncoder::new(writer).map_err(tiff_err("TIFF encoder error"))?;
    let (rows, cols) = raster.shape();

    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| if raster.is_nodata(v) { f32::NAN } else { v as f32 })
        .collect();

    let mut image = encoder
        .new_image::<Gray32Float>(cols as u32, rows as u32)
        .map_err(tiff_err("Cannot create TIFF image"))?;

    let gt = raster.transform();
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE), &scale[..])
        .map_err(tiff_err("Cannot write scale tag"))?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::from_u16_exhaustive(MODEL_TIEPOINT), &tiepoint[..])
        .map_err(tiff_err("Cannot write tiepoint tag"))?;

    let keys = geo_keys(raster.crs());
    image
        .encoder()
        .write_tag(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY), keys.as_slice())
        .map_err(tiff_err("Cannot write geokey tag"))?;

    image
        .encoder()
        .write_tag(Tag::from_u16_exhaustive(GDAL_NODATA), "nan")
        .map_err(tiff_err("Cannot write nodata tag"))?;

    image
        .write_data(&data)
        .map_err(tiff_err("Cannot write image data"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Raster<f64> {
        let mut r = Raster::from_vec(vec![290.5, 301.25, f64::NAN, 310.0], 2, 2).unwrap();
        r.set_transform(GeoTransform::new(500_000.0, 4_550_000.0, 30.0, -30.0));
        r.set_crs(Some(CRS::from_epsg(32635)));
        r.set_nodata(Some(f64::NAN));
        r
    }

    #[test]
    fn test_buffer_preserves_georeferencing() {
        let buf = write_band_to_buffer(&sample()).unwrap();
        let back = read_band_from_buffer(&buf).unwrap();

        assert_eq!(back.shape(), (2, 2));
        assert_eq!(back.transform(), sample().transform());
        assert_eq!(back.crs().and_then(CRS::epsg), Some(32635));
        assert!((back.get(0, 1).unwrap() - 301.25).abs() < 1e-4);
        assert!(back.get(1, 0).unwrap().is_nan());
    }

    #[test]
    fn test_file_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Istanbul_LST_2022.tif");
        write_band(&sample(), &path).unwrap();
        let back = read_band(&path).unwrap();
        assert_eq!(back.valid_count(), 3);
    }

    #[test]
    fn test_geo_keys_geographic() {
        let keys = geo_keys(Some(&CRS::wgs84()));
        assert_eq!(keys[3], 3);
        assert!(keys.chunks_exact(4).any(|e| e[0] == GEOGRAPHIC_TYPE_KEY && e[3] == 4326));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(read_band("/nonexistent/band.tif"), Err(Error::Io(_))));
    }
}

//! Multi-band images

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Mask, Raster};

/// An ordered set of named, pixel-aligned `f64` bands with an optional
/// validity mask.
///
/// Every band has the same shape, checked when a band is added. Bands are
/// assumed to share the first band's georeferencing; it is not compared.
/// Images are never mutated in place: the `with_*` methods consume the image
/// and return a new one.
#[derive(Debug, Clone, Default)]
pub struct RasterImage {
    bands: Vec<(String, Raster<f64>)>,
    mask: Option<Mask>,
}

impl RasterImage {
    /// Create an empty image
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an image from (name, band) pairs, in order
    pub fn from_bands<I, S>(bands: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Raster<f64>)>,
        S: Into<String>,
    {
        bands
            .into_iter()
            .try_fold(Self::new(), |image, (name, band)| image.with_band(name, band))
    }

    /// Add or replace a band.
    ///
    /// Replacing keeps the band's position in the ordering.
    pub fn with_band(mut self, name: impl Into<String>, band: Raster<f64>) -> Result<Self> {
        let name = name.into();
        if let Some((_, first)) = self.bands.first() {
            if first.shape() != band.shape() {
                return Err(Error::SizeMismatch {
                    er: first.rows(),
                    ec: first.cols(),
                    ar: band.rows(),
                    ac: band.cols(),
                });
            }
        }
        if let Some(mask) = &self.mask {
            if mask.shape() != band.shape() {
                let (er, ec) = mask.shape();
                return Err(Error::SizeMismatch {
                    er,
                    ec,
                    ar: band.rows(),
                    ac: band.cols(),
                });
            }
        }
        match self.bands.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = band,
            None => self.bands.push((name, band)),
        }
        Ok(self)
    }

    /// Intersect the image mask with `mask` (logical AND).
    ///
    /// An image without a mask adopts `mask` as-is.
    pub fn with_mask(mut self, mask: Mask) -> Result<Self> {
        if let Some((_, first)) = self.bands.first() {
            if first.shape() != mask.shape() {
                let (ar, ac) = mask.shape();
                return Err(Error::SizeMismatch {
                    er: first.rows(),
                    ec: first.cols(),
                    ar,
                    ac,
                });
            }
        }
        self.mask = Some(match self.mask.take() {
            Some(existing) => existing.and(&mask)?,
            None => mask,
        });
        Ok(self)
    }

    /// Look up a band by name
    pub fn band(&self, name: &str) -> Result<&Raster<f64>> {
        self.bands
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, b)| b)
            .ok_or_else(|| Error::MissingBand(name.to_string()))
    }

    /// Whether the image has a band with this name
    pub fn has_band(&self, name: &str) -> bool {
        self.bands.iter().any(|(n, _)| n == name)
    }

    /// Band names in order
    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Iterate over (name, band) pairs in order
    pub fn bands(&self) -> impl Iterator<Item = (&str, &Raster<f64>)> {
        self.bands.iter().map(|(n, b)| (n.as_str(), b))
    }

    /// Number of bands
    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// The image mask, if any
    pub fn mask(&self) -> Option<&Mask> {
        self.mask.as_ref()
    }

    /// Shape shared by all bands, or (0, 0) for an empty image
    pub fn shape(&self) -> (usize, usize) {
        self.bands.first().map(|(_, b)| b.shape()).unwrap_or((0, 0))
    }

    /// Georeferencing of the first band
    pub fn transform(&self) -> GeoTransform {
        self.bands
            .first()
            .map(|(_, b)| *b.transform())
            .unwrap_or_default()
    }

    /// CRS of the first band
    pub fn crs(&self) -> Option<&CRS> {
        self.bands.first().and_then(|(_, b)| b.crs())
    }

    /// Whether the pixel is unmasked by the image mask
    pub fn is_unmasked(&self, row: usize, col: usize) -> bool {
        self.mask.as_ref().map_or(true, |m| m.is_valid(row, col))
    }

    /// Effective validity of one band: image mask AND finite band value
    pub fn band_validity(&self, name: &str) -> Result<Mask> {
        let band = self.band(name)?;
        let valid = Mask::from_raster(band);
        match &self.mask {
            Some(mask) => mask.and(&valid),
            None => Ok(valid),
        }
    }

    /// Copy of a band with masked pixels set to NaN
    pub fn masked_band(&self, name: &str) -> Result<Raster<f64>> {
        let band = self.band(name)?;
        let mut out = band.clone();
        if let Some(mask) = &self.mask {
            ndarray::Zip::from(out.data_mut())
                .and(mask.data())
                .for_each(|v, &ok| {
                    if !ok {
                        *v = f64::NAN;
                    }
                });
        }
        out.set_nodata(Some(f64::NAN));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_order_and_lookup() {
        let image = RasterImage::from_bands([
            ("SR_B4", Raster::filled(2, 2, 0.1)),
            ("SR_B5", Raster::filled(2, 2, 0.4)),
        ])
        .unwrap();
        assert_eq!(image.band_names(), vec!["SR_B4", "SR_B5"]);
        assert_eq!(image.band("SR_B5").unwrap().get(0, 0).unwrap(), 0.4);
        assert!(matches!(image.band("ST_B10"), Err(Error::MissingBand(_))));
    }

    #[test]
    fn test_misaligned_band_rejected() {
        let image = RasterImage::new().with_band("a", Raster::new(2, 2)).unwrap();
        assert!(image.with_band("b", Raster::new(3, 2)).is_err());
    }

    #[test]
    fn test_image_georeferencing_from_first_band() {
        let mut first = Raster::filled(2, 2, 1.0);
        first.set_transform(GeoTransform::new(500.0, 1000.0, 30.0, -30.0));
        let mut second = Raster::filled(2, 2, 2.0);
        second.set_transform(GeoTransform::new(0.0, 0.0, 10.0, -10.0));

        let image = RasterImage::from_bands([("a", first), ("b", second)]).unwrap();
        assert_eq!(image.transform(), GeoTransform::new(500.0, 1000.0, 30.0, -30.0));
    }

    #[test]
    fn test_mask_intersection() {
        let image = RasterImage::new()
            .with_band("a", Raster::filled(1, 2, 1.0))
            .unwrap()
            .with_mask(Mask::from_vec(vec![true, true], 1, 2).unwrap())
            .unwrap()
            .with_mask(Mask::from_vec(vec![true, false], 1, 2).unwrap())
            .unwrap();
        assert!(image.is_unmasked(0, 0));
        assert!(!image.is_unmasked(0, 1));

        let masked = image.masked_band("a").unwrap();
        assert_eq!(masked.get(0, 0).unwrap(), 1.0);
        assert!(masked.get(0, 1).unwrap().is_nan());
    }

    #[test]
    fn test_band_validity_combines_nan() {
        let mut band = Raster::filled(1, 3, 1.0);
        band.set(0, 2, f64::NAN).unwrap();
        let image = RasterImage::new()
            .with_band("a", band)
            .unwrap()
            .with_mask(Mask::from_vec(vec![false, true, true], 1, 3).unwrap())
            .unwrap();
        let validity = image.band_validity("a").unwrap();
        assert_eq!(validity.count_valid(), 1);
        assert!(validity.is_valid(0, 1));
    }
}

//! Raster element trait for generic cell values

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// Trait for types that can be stored in a raster cell.
///
/// Continuous products (reflectance, temperature, indices) use `f64` with NaN
/// as the masked value; categorical products (urban state, QA flags) use
/// unsigned integers with an explicit nodata sentinel.
pub trait RasterElement:
    Copy + Clone + Debug + PartialOrd + PartialEq + NumCast + Zero + Send + Sync + 'static
{
    /// Default no-data value for this type
    fn default_nodata() -> Self;

    /// Check if this value represents no-data
    fn is_nodata(&self, nodata: Option<Self>) -> bool;

    /// Convert self to f64
    fn to_f64(self) -> Option<f64> {
        NumCast::from(self)
    }
}

macro_rules! impl_raster_element_int {
    ($t:ty) => {
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                <$t>::MAX
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                match nodata {
                    Some(nd) => *self == nd,
                    None => false,
                }
            }
        }
    };
}

macro_rules! impl_raster_element_float {
    ($t:ty) => {
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                <$t>::NAN
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                if !self.is_finite() {
                    return true;
                }
                match nodata {
                    Some(nd) => (self - nd).abs() < <$t>::EPSILON * 100.0,
                    None => false,
                }
            }
        }
    };
}

impl_raster_element_int!(u8);
impl_raster_element_int!(u16);
impl_raster_element_int!(u32);
impl_raster_element_int!(i16);
impl_raster_element_int!(i32);
impl_raster_element_float!(f32);
impl_raster_element_float!(f64);

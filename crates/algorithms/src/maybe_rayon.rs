//! Rayon or sequential iteration, selected by the `parallel` feature.
//!
//! Only the entry points used by the per-pixel passes are shimmed:
//! `into_par_iter()` and `par_iter()`. The remaining adaptor chain
//! (`map`, `flat_map`, `collect`, ...) resolves to `Iterator` methods
//! in sequential builds.

#[cfg(feature = "parallel")]
pub use rayon::prelude::*;

#[cfg(not(feature = "parallel"))]
mod sequential {
    /// Sequential stand-in for `rayon::prelude::IntoParallelIterator`
    pub trait IntoParallelIterator {
        type Iter: Iterator<Item = Self::Item>;
        type Item;
        fn into_par_iter(self) -> Self::Iter;
    }

    impl<I: IntoIterator> IntoParallelIterator for I {
        type Iter = I::IntoIter;
        type Item = I::Item;
        fn into_par_iter(self) -> Self::Iter {
            self.into_iter()
        }
    }

    /// Sequential stand-in for `rayon::prelude::IntoParallelRefIterator`
    pub trait IntoParallelRefIterator<'a> {
        type Iter: Iterator<Item = Self::Item>;
        type Item: 'a;
        fn par_iter(&'a self) -> Self::Iter;
    }

    impl<'a, T: 'a> IntoParallelRefIterator<'a> for [T] {
        type Iter = std::slice::Iter<'a, T>;
        type Item = &'a T;
        fn par_iter(&'a self) -> Self::Iter {
            self.iter()
        }
    }
}

#[cfg(not(feature = "parallel"))]
pub use sequential::*;

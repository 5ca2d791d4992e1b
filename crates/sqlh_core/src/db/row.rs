//! Mapping result rows into caller-chosen shapes.

use rusqlite::types::{FromSql, Value};
use rusqlite::Row;

/// A value that can be built from one result row.
///
/// Implemented for single-column scalars, `Option` of any SQLite-readable
/// type, and tuples of up to six columns. Application structs implement it by
/// reading columns by name or index:
///
/// ```ignore
/// struct Job { id: String, queue: String }
///
/// impl FromRow for Job {
///     fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
///         Ok(Self { id: row.get("id")?, queue: row.get("queue")? })
///     }
/// }
/// ```
pub trait FromRow: Sized {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

macro_rules! impl_from_row_for_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromRow for $ty {
                fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
                    row.get(0)
                }
            }
        )*
    };
}

impl_from_row_for_scalar!(bool, i8, i16, i32, i64, u8, u16, u32, f32, f64, String, Vec<u8>, Value);

impl<T: FromSql> FromRow for Option<T> {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        row.get(0)
    }
}

macro_rules! impl_from_row_for_tuple {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: FromSql),+> FromRow for ($($name,)+) {
            fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
                Ok(($(row.get::<usize, $name>($idx)?,)+))
            }
        }
    };
}

impl_from_row_for_tuple!(A: 0);
impl_from_row_for_tuple!(A: 0, B: 1);
impl_from_row_for_tuple!(A: 0, B: 1, C: 2);
impl_from_row_for_tuple!(A: 0, B: 1, C: 2, D: 3);
impl_from_row_for_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4);
impl_from_row_for_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);

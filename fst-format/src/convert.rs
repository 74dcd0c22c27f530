//! Tabular and labeled-array views of a record.
//!
//! Both views are plain owned data so that callers can hand them to whatever
//! dataframe or n-dimensional array library they use.

use serde_json::{Map, Value};

use crate::array::{Array, ArrayData};
use crate::metadata::RecordMetadata;

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Text(Vec<String>),
    Int(Vec<i64>),
    UInt(Vec<u32>),
    /// Payload values in their stored element type.
    Values(ArrayData),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Text(v) => v.len(),
            ColumnValues::Int(v) => v.len(),
            ColumnValues::UInt(v) => v.len(),
            ColumnValues::Values(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn json(&self, row: usize) -> Value {
        match self {
            ColumnValues::Text(v) => Value::from(v[row].as_str()),
            ColumnValues::Int(v) => Value::from(v[row]),
            ColumnValues::UInt(v) => Value::from(v[row]),
            ColumnValues::Values(v) => match v {
                ArrayData::I32(v) => Value::from(v[row]),
                ArrayData::U32(v) => Value::from(v[row]),
                // Non-finite floats become null.
                v => v.get_f64(row).map(Value::from).unwrap_or(Value::Null),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: &'static str,
    pub values: ColumnValues,
}

/// One row per payload element.
///
/// Columns are `nomvar typvar etiket ip1 ip2 ip3 datev i j k value`, with the
/// record-level keys repeated on every row.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|c| c.values.len()).unwrap_or(0)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnValues> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.values)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// The table as a JSON array of row objects.
    pub fn to_json_rows(&self) -> Value {
        let rows = (0..self.num_rows())
            .map(|row| {
                let obj: Map<String, Value> = self
                    .columns
                    .iter()
                    .map(|c| (c.name.to_string(), c.values.json(row)))
                    .collect();
                Value::Object(obj)
            })
            .collect();
        Value::Array(rows)
    }
}

pub fn to_table(meta: &RecordMetadata, array: &Array) -> Table {
    let shape = array.shape();
    let rows = array.len();

    let mut i = Vec::with_capacity(rows);
    let mut j = Vec::with_capacity(rows);
    let mut k = Vec::with_capacity(rows);
    for kk in 0..shape.nk() {
        for jj in 0..shape.nj() {
            for ii in 0..shape.ni() {
                i.push(ii);
                j.push(jj);
                k.push(kk);
            }
        }
    }

    let text = |s: &str| ColumnValues::Text(vec![s.to_string(); rows]);
    let int = |x: i64| ColumnValues::Int(vec![x; rows]);
    let columns = vec![
        Column { name: "nomvar", values: text(&meta.nomvar) },
        Column { name: "typvar", values: text(&meta.typvar) },
        Column { name: "etiket", values: text(&meta.etiket) },
        Column { name: "ip1", values: int(meta.ip1 as i64) },
        Column { name: "ip2", values: int(meta.ip2 as i64) },
        Column { name: "ip3", values: int(meta.ip3 as i64) },
        Column { name: "datev", values: int(meta.datev) },
        Column { name: "i", values: ColumnValues::UInt(i) },
        Column { name: "j", values: ColumnValues::UInt(j) },
        Column { name: "k", values: ColumnValues::UInt(k) },
        Column { name: "value", values: ColumnValues::Values(array.data().clone()) },
    ];
    Table { columns }
}

/// An array with named dimensions, integer coordinates and metadata attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledArray {
    name: String,
    dims: Vec<&'static str>,
    coords: Vec<(&'static str, Vec<u32>)>,
    data: Array,
    attrs: Map<String, Value>,
}

impl LabeledArray {
    /// The record's `nomvar`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `["i", "j"]` for single-level records, `["i", "j", "k"]` otherwise.
    pub fn dims(&self) -> &[&'static str] {
        &self.dims
    }

    pub fn coord(&self, dim: &str) -> Option<&[u32]> {
        self.coords
            .iter()
            .find(|(d, _)| *d == dim)
            .map(|(_, c)| c.as_slice())
    }

    /// Length of each dimension in `dims` order.
    pub fn sizes(&self) -> Vec<usize> {
        self.coords.iter().map(|(_, c)| c.len()).collect()
    }

    pub fn data(&self) -> &Array {
        &self.data
    }

    pub fn into_data(self) -> Array {
        self.data
    }

    pub fn attrs(&self) -> &Map<String, Value> {
        &self.attrs
    }
}

pub fn to_labeled_array(meta: &RecordMetadata, array: &Array) -> LabeledArray {
    let shape = array.shape();
    let mut coords = vec![
        ("i", (0..shape.ni()).collect::<Vec<_>>()),
        ("j", (0..shape.nj()).collect()),
    ];
    if shape.nk() > 1 {
        coords.push(("k", (0..shape.nk()).collect()));
    }
    let dims = coords.iter().map(|(d, _)| *d).collect();

    let mut attrs = Map::new();
    attrs.insert("typvar".into(), meta.typvar.clone().into());
    attrs.insert("etiket".into(), meta.etiket.clone().into());
    attrs.insert("ip1".into(), meta.ip1.into());
    attrs.insert("ip2".into(), meta.ip2.into());
    attrs.insert("ip3".into(), meta.ip3.into());
    attrs.insert("dateo".into(), meta.dateo.into());
    attrs.insert("datev".into(), meta.datev.into());
    attrs.insert("deet".into(), meta.deet.into());
    attrs.insert("npas".into(), meta.npas.into());
    attrs.insert("grtyp".into(), meta.grtyp.clone().into());
    attrs.insert("ig1".into(), meta.ig1.into());
    attrs.insert("ig2".into(), meta.ig2.into());
    attrs.insert("ig3".into(), meta.ig3.into());
    attrs.insert("ig4".into(), meta.ig4.into());

    LabeledArray {
        name: meta.nomvar.clone(),
        dims,
        coords,
        data: array.clone(),
        attrs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::Shape;

    fn sample(nk: u32) -> (RecordMetadata, Array) {
        let shape = Shape::new(2, 3, nk).unwrap();
        let values: Vec<i32> = (0..shape.len() as i32).collect();
        let meta = RecordMetadata {
            ip1: 500,
            datev: 1_000,
            ..RecordMetadata::new("TT", shape)
        };
        (meta, Array::new(shape, values).unwrap())
    }

    #[test]
    fn table_has_one_row_per_element() {
        let (meta, array) = sample(2);
        let table = to_table(&meta, &array);
        assert_eq!(table.num_rows(), 12);
        assert_eq!(table.num_columns(), 11);
        assert_eq!(
            table.column_names().collect::<Vec<_>>(),
            vec!["nomvar", "typvar", "etiket", "ip1", "ip2", "ip3", "datev", "i", "j", "k", "value"]
        );

        // Row 7 is (i=1, j=0, k=1) in column-major order.
        let ColumnValues::UInt(i) = table.column("i").unwrap() else { panic!() };
        let ColumnValues::UInt(j) = table.column("j").unwrap() else { panic!() };
        let ColumnValues::UInt(k) = table.column("k").unwrap() else { panic!() };
        assert_eq!((i[7], j[7], k[7]), (1, 0, 1));
        assert_eq!(table.column("value"), Some(&ColumnValues::Values(array.data().clone())));
        assert!(table.column("ip4").is_none());
    }

    #[test]
    fn table_exports_json_rows() {
        let (meta, array) = sample(1);
        let rows = to_table(&meta, &array).to_json_rows();
        let rows = rows.as_array().unwrap();
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[5]["nomvar"], "TT");
        assert_eq!(rows[5]["ip1"], 500);
        assert_eq!(rows[5]["i"], 1);
        assert_eq!(rows[5]["j"], 2);
        assert_eq!(rows[5]["value"], 5);
    }

    #[test]
    fn non_finite_values_export_as_null() {
        let shape = Shape::plane(2, 1).unwrap();
        let array = Array::new(shape, vec![f32::NAN, 1.5]).unwrap();
        let rows = to_table(&RecordMetadata::new("UU", shape), &array).to_json_rows();
        assert!(rows[0]["value"].is_null());
        assert_eq!(rows[1]["value"], 1.5);
    }

    #[test]
    fn labeled_array_drops_single_level() {
        let (meta, array) = sample(1);
        let labeled = to_labeled_array(&meta, &array);
        assert_eq!(labeled.name(), "TT");
        assert_eq!(labeled.dims(), &["i", "j"]);
        assert_eq!(labeled.sizes(), vec![2, 3]);
        assert_eq!(labeled.coord("j"), Some(&[0u32, 1, 2][..]));
        assert!(labeled.coord("k").is_none());
        assert_eq!(labeled.attrs()["ip1"], 500);
        assert_eq!(labeled.attrs()["grtyp"], "X");
        assert_eq!(labeled.into_data(), array);

        let (meta, array) = sample(4);
        let labeled = to_labeled_array(&meta, &array);
        assert_eq!(labeled.dims(), &["i", "j", "k"]);
        assert_eq!(labeled.sizes(), vec![2, 3, 4]);
    }
}

use crate::array::Shape;
use crate::error::{Error, Result};

pub const NOMVAR_LEN: usize = 4;
pub const TYPVAR_LEN: usize = 2;
pub const ETIKET_LEN: usize = 12;

/// Descriptive metadata of one record. Immutable once the record is written.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordMetadata {
    /// Variable name, up to 4 characters.
    pub nomvar: String,
    /// Type of field (analysis, forecast, ...), up to 2 characters.
    pub typvar: String,
    /// Free-form label, up to 12 characters.
    pub etiket: String,
    /// Vertical level encoding.
    pub ip1: i32,
    /// Forecast hour encoding.
    pub ip2: i32,
    /// User-defined identifier.
    pub ip3: i32,
    /// Origin date stamp.
    pub dateo: i64,
    /// Valid date stamp.
    pub datev: i64,
    /// Length of a time step in seconds.
    pub deet: i32,
    /// Time step number.
    pub npas: i32,
    pub ni: u32,
    pub nj: u32,
    pub nk: u32,
    /// Grid type, exactly one character. `ig1..ig4` are interpreted according to it.
    pub grtyp: String,
    pub ig1: i32,
    pub ig2: i32,
    pub ig3: i32,
    pub ig4: i32,
}

impl RecordMetadata {
    /// Metadata for `nomvar` over `shape` with every other key zeroed,
    /// `typvar = "P"` and `grtyp = "X"`.
    pub fn new(nomvar: impl Into<String>, shape: Shape) -> RecordMetadata {
        RecordMetadata {
            nomvar: nomvar.into(),
            typvar: "P".into(),
            etiket: String::new(),
            ip1: 0,
            ip2: 0,
            ip3: 0,
            dateo: 0,
            datev: 0,
            deet: 0,
            npas: 0,
            ni: shape.ni(),
            nj: shape.nj(),
            nk: shape.nk(),
            grtyp: "X".into(),
            ig1: 0,
            ig2: 0,
            ig3: 0,
            ig4: 0,
        }
    }

    pub fn shape(&self) -> Result<Shape> {
        Shape::new(self.ni, self.nj, self.nk).map_err(|_| {
            Error::InvalidMetadata(format!(
                "ni, nj, nk must be at least 1, got ({}, {}, {})",
                self.ni, self.nj, self.nk
            ))
        })
    }

    /// Trim trailing blanks from the text keys and check them against the
    /// fixed widths of the format.
    pub(crate) fn normalized(mut self) -> Result<RecordMetadata> {
        trim_in_place(&mut self.nomvar);
        trim_in_place(&mut self.typvar);
        trim_in_place(&mut self.etiket);
        trim_in_place(&mut self.grtyp);

        check_text("nomvar", &self.nomvar, NOMVAR_LEN)?;
        check_text("typvar", &self.typvar, TYPVAR_LEN)?;
        check_text("etiket", &self.etiket, ETIKET_LEN)?;
        check_text("grtyp", &self.grtyp, 1)?;
        if self.grtyp.is_empty() {
            return Err(Error::InvalidMetadata("grtyp must be one character".into()));
        }
        self.shape()?;
        Ok(self)
    }
}

fn trim_in_place(s: &mut String) {
    let len = s.trim_end_matches(' ').len();
    s.truncate(len);
}

fn check_text(field: &str, value: &str, max: usize) -> Result<()> {
    if !value.is_ascii() {
        return Err(Error::InvalidMetadata(format!(
            "{} must be ASCII, got {:?}",
            field, value
        )));
    }
    if value.len() > max {
        return Err(Error::InvalidMetadata(format!(
            "{} holds at most {} characters, got {:?}",
            field, max, value
        )));
    }
    Ok(())
}

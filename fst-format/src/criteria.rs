use crate::metadata::RecordMetadata;

/// Search keys for [`FstFile::find`](crate::FstFile::find).
///
/// Every key left unset is a wildcard. Text keys ignore trailing blanks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Criteria {
    pub nomvar: Option<String>,
    pub typvar: Option<String>,
    pub etiket: Option<String>,
    pub ip1: Option<i32>,
    pub ip2: Option<i32>,
    pub ip3: Option<i32>,
    pub dateo: Option<i64>,
    pub datev: Option<i64>,
    pub deet: Option<i32>,
    pub npas: Option<i32>,
    pub ni: Option<u32>,
    pub nj: Option<u32>,
    pub nk: Option<u32>,
    pub grtyp: Option<String>,
    pub ig1: Option<i32>,
    pub ig2: Option<i32>,
    pub ig3: Option<i32>,
    pub ig4: Option<i32>,
}

impl Criteria {
    /// Matches every live record.
    pub fn any() -> Criteria {
        Criteria::default()
    }

    pub fn nomvar(mut self, nomvar: impl Into<String>) -> Self {
        self.nomvar = Some(nomvar.into());
        self
    }

    pub fn typvar(mut self, typvar: impl Into<String>) -> Self {
        self.typvar = Some(typvar.into());
        self
    }

    pub fn etiket(mut self, etiket: impl Into<String>) -> Self {
        self.etiket = Some(etiket.into());
        self
    }

    pub fn grtyp(mut self, grtyp: impl Into<String>) -> Self {
        self.grtyp = Some(grtyp.into());
        self
    }

    pub fn ip1(mut self, ip1: i32) -> Self {
        self.ip1 = Some(ip1);
        self
    }

    pub fn ip2(mut self, ip2: i32) -> Self {
        self.ip2 = Some(ip2);
        self
    }

    pub fn ip3(mut self, ip3: i32) -> Self {
        self.ip3 = Some(ip3);
        self
    }

    pub fn dateo(mut self, dateo: i64) -> Self {
        self.dateo = Some(dateo);
        self
    }

    pub fn datev(mut self, datev: i64) -> Self {
        self.datev = Some(datev);
        self
    }

    pub fn deet(mut self, deet: i32) -> Self {
        self.deet = Some(deet);
        self
    }

    pub fn npas(mut self, npas: i32) -> Self {
        self.npas = Some(npas);
        self
    }

    pub fn shape(mut self, ni: u32, nj: u32, nk: u32) -> Self {
        self.ni = Some(ni);
        self.nj = Some(nj);
        self.nk = Some(nk);
        self
    }

    pub fn ig(mut self, ig1: i32, ig2: i32, ig3: i32, ig4: i32) -> Self {
        self.ig1 = Some(ig1);
        self.ig2 = Some(ig2);
        self.ig3 = Some(ig3);
        self.ig4 = Some(ig4);
        self
    }

    pub fn matches(&self, meta: &RecordMetadata) -> bool {
        text_matches(&self.nomvar, &meta.nomvar)
            && text_matches(&self.typvar, &meta.typvar)
            && text_matches(&self.etiket, &meta.etiket)
            && text_matches(&self.grtyp, &meta.grtyp)
            && key_matches(self.ip1, meta.ip1)
            && key_matches(self.ip2, meta.ip2)
            && key_matches(self.ip3, meta.ip3)
            && key_matches(self.dateo, meta.dateo)
            && key_matches(self.datev, meta.datev)
            && key_matches(self.deet, meta.deet)
            && key_matches(self.npas, meta.npas)
            && key_matches(self.ni, meta.ni)
            && key_matches(self.nj, meta.nj)
            && key_matches(self.nk, meta.nk)
            && key_matches(self.ig1, meta.ig1)
            && key_matches(self.ig2, meta.ig2)
            && key_matches(self.ig3, meta.ig3)
            && key_matches(self.ig4, meta.ig4)
    }
}

#[inline(always)]
fn key_matches<T: PartialEq>(wanted: Option<T>, actual: T) -> bool {
    wanted.map_or(true, |w| w == actual)
}

#[inline(always)]
fn text_matches(wanted: &Option<String>, actual: &str) -> bool {
    match wanted {
        None => true,
        Some(w) => w.trim_end_matches(' ') == actual.trim_end_matches(' '),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::Shape;

    fn meta() -> RecordMetadata {
        RecordMetadata {
            ip1: 500,
            etiket: "GEM".into(),
            ..RecordMetadata::new("TT", Shape::new(10, 5, 1).unwrap())
        }
    }

    #[test]
    fn empty_criteria_match_everything() {
        assert!(Criteria::any().matches(&meta()));
    }

    #[test]
    fn every_set_key_must_match() {
        let m = meta();
        assert!(Criteria::any().nomvar("TT").ip1(500).matches(&m));
        assert!(!Criteria::any().nomvar("TT").ip1(700).matches(&m));
        assert!(!Criteria::any().nomvar("UU").matches(&m));
        assert!(Criteria::any().shape(10, 5, 1).matches(&m));
        assert!(!Criteria::any().shape(10, 5, 2).matches(&m));
        assert!(Criteria::any().ig(0, 0, 0, 0).matches(&m));
    }

    #[test]
    fn text_keys_ignore_padding() {
        let m = meta();
        assert!(Criteria::any().nomvar("TT  ").matches(&m));
        assert!(Criteria::any().etiket("GEM         ").matches(&m));
        assert!(!Criteria::any().etiket(" GEM").matches(&m));
    }
}

//! Canonical staging schema and alias resolution.
//!
//! TSE renamed columns between releases (`NR_ZONA` became `NU_ZONA`,
//! `QTDE_VOTOS` became `QT_VOTOS`, and so on). This module owns the static
//! alias table mapping each [`CanonicalField`] to the source names it accepts,
//! and the [`SchemaBinding`] that is resolved once from a file header and then
//! reused for every chunk of that file.
//!
//! ## Binding rules
//!
//! - Aliases are tried in priority order; the first one present in the header
//!   wins, regardless of where it appears in the header.
//! - Header names are compared after trimming, ignoring ASCII case.
//! - When a header repeats a name, its first occurrence binds.
//! - A canonical field with no matching column is absent from the output.

use anyhow::{Result, bail};
use csv::StringRecord;
use serde::{Deserialize, Serialize};

use crate::{
    data::{Value, parse_cell},
    io_utils,
};

/// Bumped whenever an alias is added, removed, or reprioritised.
pub const ALIAS_TABLE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    NrTurno,
    CdEleicao,
    SgUf,
    CdMunicipio,
    NmMunicipio,
    NuZona,
    NuSecao,
    CdCargo,
    DsCargoPergunta,
    NrVotavel,
    NmVotavel,
    QtVotos,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 12] = [
        CanonicalField::NrTurno,
        CanonicalField::CdEleicao,
        CanonicalField::SgUf,
        CanonicalField::CdMunicipio,
        CanonicalField::NmMunicipio,
        CanonicalField::NuZona,
        CanonicalField::NuSecao,
        CanonicalField::CdCargo,
        CanonicalField::DsCargoPergunta,
        CanonicalField::NrVotavel,
        CanonicalField::NmVotavel,
        CanonicalField::QtVotos,
    ];

    pub fn column_name(self) -> &'static str {
        match self {
            CanonicalField::NrTurno => "nr_turno",
            CanonicalField::CdEleicao => "cd_eleicao",
            CanonicalField::SgUf => "sg_uf",
            CanonicalField::CdMunicipio => "cd_municipio",
            CanonicalField::NmMunicipio => "nm_municipio",
            CanonicalField::NuZona => "nu_zona",
            CanonicalField::NuSecao => "nu_secao",
            CanonicalField::CdCargo => "cd_cargo",
            CanonicalField::DsCargoPergunta => "ds_cargo_pergunta",
            CanonicalField::NrVotavel => "nr_votavel",
            CanonicalField::NmVotavel => "nm_votavel",
            CanonicalField::QtVotos => "qt_votos",
        }
    }

    /// Accepted source column names, highest priority first.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            CanonicalField::NrTurno => &["NR_TURNO"],
            CanonicalField::CdEleicao => &["CD_ELEICAO"],
            CanonicalField::SgUf => &["SG_UF"],
            CanonicalField::CdMunicipio => &["CD_MUNICIPIO", "CD_MUN_SGE", "CD_MUNICIPIO_TSE"],
            CanonicalField::NmMunicipio => &["NM_MUNICIPIO", "NM_MUN_SGE"],
            CanonicalField::NuZona => &["NU_ZONA", "NR_ZONA"],
            CanonicalField::NuSecao => &["NU_SECAO", "NR_SECAO"],
            CanonicalField::CdCargo => &["CD_CARGO"],
            CanonicalField::DsCargoPergunta => &["DS_CARGO_PERGUNTA", "DS_CARGO"],
            CanonicalField::NrVotavel => &["NR_VOTAVEL", "NR_CANDIDATO"],
            CanonicalField::NmVotavel => &["NM_VOTAVEL", "NM_CANDIDATO"],
            CanonicalField::QtVotos => &[
                "QT_VOTOS",
                "QTDE_VOTOS",
                "QT_VOTOS_NOMINAIS",
                "QT_VOTOS_TOTAL",
            ],
        }
    }

    pub fn sql_type(self) -> &'static str {
        match self {
            CanonicalField::SgUf => "VARCHAR(2)",
            CanonicalField::NmMunicipio
            | CanonicalField::DsCargoPergunta
            | CanonicalField::NmVotavel => "VARCHAR(200)",
            _ => "INTEGER",
        }
    }

    /// Fields coerced to nullable integers after row filtering.
    pub fn is_integer_coded(self) -> bool {
        matches!(
            self,
            CanonicalField::NrTurno
                | CanonicalField::CdEleicao
                | CanonicalField::CdMunicipio
                | CanonicalField::NuZona
                | CanonicalField::NuSecao
                | CanonicalField::CdCargo
                | CanonicalField::NrVotavel
        )
    }

    /// Fields whose null value drops the row, when the file provides them.
    pub fn is_required(self) -> bool {
        matches!(
            self,
            CanonicalField::SgUf | CanonicalField::NmMunicipio | CanonicalField::QtVotos
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundColumn {
    pub field: CanonicalField,
    pub source: String,
    pub index: usize,
}

/// Per-file decision of which source column feeds each canonical field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaBinding {
    columns: Vec<BoundColumn>,
}

impl SchemaBinding {
    pub fn resolve<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let headers = headers
            .into_iter()
            .map(|h| io_utils::clean_header(h.as_ref()).to_string())
            .collect::<Vec<_>>();
        let columns = CanonicalField::ALL
            .iter()
            .filter_map(|&field| {
                field.aliases().iter().find_map(|alias| {
                    headers
                        .iter()
                        .position(|header| header.eq_ignore_ascii_case(alias))
                        .map(|index| BoundColumn {
                            field,
                            source: headers[index].clone(),
                            index,
                        })
                })
            })
            .collect();
        Self { columns }
    }

    pub fn columns(&self) -> &[BoundColumn] {
        &self.columns
    }

    pub fn fields(&self) -> Vec<CanonicalField> {
        self.columns.iter().map(|column| column.field).collect()
    }

    pub fn source_for(&self, field: CanonicalField) -> Option<&str> {
        self.columns
            .iter()
            .find(|column| column.field == field)
            .map(|column| column.source.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Projects one raw record onto the bound fields. Missing trailing cells
    /// read as null.
    pub fn normalize_record(&self, record: &StringRecord) -> Vec<Option<Value>> {
        self.columns
            .iter()
            .map(|column| record.get(column.index).and_then(parse_cell))
            .collect()
    }

    pub fn normalize(&self, records: &[StringRecord]) -> NormalizedChunk {
        if self.is_empty() {
            return NormalizedChunk::default();
        }
        NormalizedChunk {
            fields: self.fields(),
            rows: records
                .iter()
                .map(|record| self.normalize_record(record))
                .collect(),
        }
    }
}

/// Resolves a binding from `columns` and applies it to `rows` in one step.
pub fn normalize<S: AsRef<str>>(columns: &[S], rows: &[StringRecord]) -> NormalizedChunk {
    SchemaBinding::resolve(columns).normalize(rows)
}

/// Rows projected onto the canonical fields bound for one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedChunk {
    fields: Vec<CanonicalField>,
    rows: Vec<Vec<Option<Value>>>,
}

impl NormalizedChunk {
    /// Builds a chunk from explicit rows; every row must have one cell per field.
    pub fn new(fields: Vec<CanonicalField>, rows: Vec<Vec<Option<Value>>>) -> Result<Self> {
        if let Some(position) = rows.iter().position(|row| row.len() != fields.len()) {
            bail!(
                "Row {position} has {} cell(s) but {} field(s) are bound",
                rows[position].len(),
                fields.len()
            );
        }
        Ok(Self { fields, rows })
    }

    /// Reassembles parts taken from a chunk by [`NormalizedChunk::into_parts`].
    pub(crate) fn from_parts(fields: Vec<CanonicalField>, rows: Vec<Vec<Option<Value>>>) -> Self {
        Self { fields, rows }
    }

    pub fn fields(&self) -> &[CanonicalField] {
        &self.fields
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|field| field.column_name()).collect()
    }

    pub fn position(&self, field: CanonicalField) -> Option<usize> {
        self.fields.iter().position(|candidate| *candidate == field)
    }

    pub fn rows(&self) -> &[Vec<Option<Value>>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn value(&self, row: usize, field: CanonicalField) -> Option<&Value> {
        let column = self.position(field)?;
        self.rows.get(row)?.get(column)?.as_ref()
    }

    pub fn into_parts(self) -> (Vec<CanonicalField>, Vec<Vec<Option<Value>>>) {
        (self.fields, self.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(values: &[&str]) -> StringRecord {
        StringRecord::from(values.to_vec())
    }

    #[test]
    fn resolve_prefers_first_alias_in_priority_order() {
        let binding = SchemaBinding::resolve(["QT_VOTOS_TOTAL", "SG_UF", "QTDE_VOTOS"]);
        assert_eq!(binding.source_for(CanonicalField::QtVotos), Some("QTDE_VOTOS"));
        assert_eq!(binding.source_for(CanonicalField::SgUf), Some("SG_UF"));
        assert_eq!(binding.len(), 2);
    }

    #[test]
    fn resolve_orders_output_by_canonical_schema() {
        let binding = SchemaBinding::resolve(["QT_VOTOS", "NM_MUNICIPIO", "NR_TURNO"]);
        assert_eq!(
            binding.fields(),
            vec![
                CanonicalField::NrTurno,
                CanonicalField::NmMunicipio,
                CanonicalField::QtVotos
            ]
        );
    }

    #[test]
    fn resolve_matches_case_insensitively_and_ignores_bom() {
        let binding = SchemaBinding::resolve(["\u{feff}nr_turno", " Sg_Uf "]);
        assert_eq!(binding.source_for(CanonicalField::NrTurno), Some("nr_turno"));
        assert_eq!(binding.source_for(CanonicalField::SgUf), Some("Sg_Uf"));
    }

    #[test]
    fn resolve_binds_first_duplicate_occurrence() {
        let binding = SchemaBinding::resolve(["SG_UF", "SG_UF"]);
        assert_eq!(binding.columns()[0].index, 0);
    }

    #[test]
    fn normalize_without_matches_yields_empty_chunk() {
        let chunk = normalize(&["FOO", "BAR"], &[record(&["1", "2"])]);
        assert!(chunk.is_empty());
        assert!(chunk.fields().is_empty());
    }

    #[test]
    fn normalize_drops_unmapped_columns_and_reads_null_tokens() {
        let chunk = normalize(
            &["DT_GERACAO", "SG_UF", "NM_MUNICIPIO"],
            &[record(&["01/10/2022", "SP", "#NULO#"])],
        );
        assert_eq!(chunk.column_names(), vec!["sg_uf", "nm_municipio"]);
        assert_eq!(chunk.rows()[0], vec![Some(Value::Text("SP".into())), None]);
    }

    #[test]
    fn normalize_pads_short_records_with_nulls() {
        let chunk = normalize(&["SG_UF", "QT_VOTOS"], &[record(&["RJ"])]);
        assert_eq!(chunk.value(0, CanonicalField::SgUf), Some(&Value::Text("RJ".into())));
        assert_eq!(chunk.value(0, CanonicalField::QtVotos), None);
    }

    #[test]
    fn new_rejects_rows_that_do_not_match_the_fields() {
        let fields = vec![CanonicalField::SgUf, CanonicalField::QtVotos];
        let ragged = vec![
            vec![Some(Value::Text("SP".into())), Some(Value::Integer(1))],
            vec![Some(Value::Text("RJ".into()))],
        ];
        let err = NormalizedChunk::new(fields.clone(), ragged).expect_err("ragged rows");
        assert!(err.to_string().contains("Row 1 has 1 cell(s)"));

        let chunk = NormalizedChunk::new(fields, vec![vec![None, Some(Value::Integer(2))]])
            .expect("well-formed rows");
        assert_eq!(chunk.len(), 1);
    }

    #[test]
    fn every_field_lists_its_own_name_first() {
        for field in CanonicalField::ALL {
            assert!(field.aliases()[0].eq_ignore_ascii_case(field.column_name()));
        }
    }
}

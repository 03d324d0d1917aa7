//! Canonical student-document schema: field registry, legacy alias tables,
//! and the typed views used at the API edges.
//!
//! Stored documents are plain JSON objects and may carry extra keys inherited
//! from older import formats. Those keys never reach business logic directly;
//! only the resolver in `normalize::resolve` consults them, through the alias
//! tables defined here.

use serde::{Deserialize, Serialize};

/// Fixed length of a normalized CPF (digits only, left-padded).
pub const CPF_LEN: usize = 11;

/// School name stamped on backfilled academic-history entries.
pub const SCHOOL_NAME: &str = "E.E.F. NAIR CUNHA DE AGUIAR";

/// How a canonical field's raw value is coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Trim ends, keep interior whitespace and casing.
    Text,
    /// Strip non-digits, left-pad with '0' to `CPF_LEN`.
    Digits11,
    /// Remove all whitespace (card numbers).
    Compact,
    /// Parse to a calendar date, stored as YYYY-MM-DD; unparseable -> absent.
    Date,
    /// Open enumeration: pass through trimmed, known member or not.
    OpenEnum,
}

/// One canonical attribute plus its legacy alias keys, most recent format
/// first. Ordering is precedence: the first non-empty alias wins.
pub struct FieldSpec {
    pub canonical: &'static str,
    pub kind: FieldKind,
    pub aliases: &'static [&'static str],
}

/// The alias tables come straight from the historical import formats; the
/// misspelled variants ("Home do Aluno", "Data de Masc.") are real keys left
/// behind by an early OCR import.
pub const FIELD_SPECS: &[FieldSpec] = &[
    FieldSpec {
        canonical: "nome",
        kind: FieldKind::Text,
        aliases: &["Nome do Aluno", "Home do Aluno"],
    },
    FieldSpec {
        canonical: "dataNascimento",
        kind: FieldKind::Date,
        aliases: &[
            "Data de Nasc.",
            "Data de Nasc",
            "Data de Masc.",
            "Data de Masc",
            "Data de Mace.",
        ],
    },
    FieldSpec {
        canonical: "cpf",
        kind: FieldKind::Digits11,
        aliases: &["CPF"],
    },
    FieldSpec {
        canonical: "cartaoSUS",
        kind: FieldKind::Compact,
        aliases: &["Cartão do SUS"],
    },
    FieldSpec {
        canonical: "nomeMae",
        kind: FieldKind::Text,
        aliases: &["Nome Mae", "Nome Mãe"],
    },
    FieldSpec {
        canonical: "nomePai",
        kind: FieldKind::Text,
        aliases: &["Nome Pai"],
    },
    FieldSpec {
        canonical: "serieAno",
        kind: FieldKind::Text,
        aliases: &["Série/Ano"],
    },
    FieldSpec {
        canonical: "turma",
        kind: FieldKind::Text,
        aliases: &["Turma"],
    },
    FieldSpec {
        canonical: "turno",
        kind: FieldKind::OpenEnum,
        aliases: &["Turno"],
    },
    FieldSpec {
        canonical: "status",
        kind: FieldKind::OpenEnum,
        aliases: &["Status"],
    },
    FieldSpec {
        canonical: "transporte",
        kind: FieldKind::Text,
        aliases: &["Transporte"],
    },
    FieldSpec {
        canonical: "localidade",
        kind: FieldKind::Text,
        aliases: &["Localidade"],
    },
];

/// Keys that carry no information by construction (truncated key names and an
/// empty key produced by a broken spreadsheet export). Always removed.
pub const JUNK_KEYS: &[&str] = &["Data de ", ""];

pub fn spec_for(canonical: &str) -> Option<&'static FieldSpec> {
    FIELD_SPECS.iter().find(|s| s.canonical == canonical)
}

/// Enrollment status assigned to records created without one. `turno` and
/// `status` are open enumerations; the normalizer passes unknown members
/// through unchanged rather than policing a closed list.
pub const STATUS_MATRICULADO: &str = "Matriculado";

/// Per-subject grade entry: four term scores plus the derived final average
/// and pass/fail status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotaEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub disciplina: String,
    #[serde(default)]
    pub serie: String,
    #[serde(default)]
    pub bimestre1: Option<f64>,
    #[serde(default)]
    pub bimestre2: Option<f64>,
    #[serde(default)]
    pub bimestre3: Option<f64>,
    #[serde(default)]
    pub bimestre4: Option<f64>,
    #[serde(rename = "mediaFinal", default)]
    pub media_final: Option<f64>,
    #[serde(default)]
    pub situacao: Option<String>,
}

impl NotaEntry {
    /// Mean of the four term scores, when all four are present.
    pub fn computed_media(&self) -> Option<f64> {
        match (self.bimestre1, self.bimestre2, self.bimestre3, self.bimestre4) {
            (Some(a), Some(b), Some(c), Some(d)) => Some((a + b + c + d) / 4.0),
            _ => None,
        }
    }
}

/// Passing threshold for a subject's final average.
pub const MEDIA_APROVACAO: f64 = 6.0;

pub fn situacao_for_media(media: f64) -> &'static str {
    if media >= MEDIA_APROVACAO {
        "Aprovado"
    } else {
        "Em Recuperação"
    }
}

/// One academic year in a student's history, aggregating the subject grades
/// earned that year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricoEntry {
    pub id: String,
    #[serde(rename = "anoLetivo")]
    pub ano_letivo: String,
    pub serie: String,
    #[serde(default)]
    pub turma: String,
    #[serde(default)]
    pub turno: String,
    #[serde(default)]
    pub escola: String,
    #[serde(default)]
    pub disciplinas: Vec<NotaEntry>,
    #[serde(rename = "mediaGeral", default)]
    pub media_geral: Option<f64>,
    #[serde(rename = "situacaoGeral", default)]
    pub situacao_geral: Option<String>,
    /// Attendance record, filled in by the office later; backfilled entries
    /// carry it empty.
    #[serde(default)]
    pub frequencia: String,
    #[serde(default)]
    pub observacoes: String,
}

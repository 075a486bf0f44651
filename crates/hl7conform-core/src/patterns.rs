/// Compiled regular expressions shared by the location parser and the
/// datatype checks.
use std::sync::LazyLock;

use regex::Regex;

/// Compiles a pattern literal.
///
/// Every pattern in this module is a literal known to be valid, so the error
/// branch is never taken; `a^` (matches nothing) keeps the workspace ban on
/// `unwrap`/`expect` intact.
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|_| {
        Regex::new("a^").unwrap_or_else(|_| unreachable!("regex engine broken"))
    })
}

// ---------------------------------------------------------------------------
// Location syntax
// ---------------------------------------------------------------------------

/// `SEG[n].f[n].c.s` with every part after the segment code optional.
pub(crate) static FLAT_SEGMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"^([A-Z0-9]{3})(?:\[(\d+)\])?(?:\.(\d+)(?:\[(\d+)\])?(?:\.(\d+)(?:\.(\d+))?)?)?$")
});

/// One `GROUP[n]` step of a group-qualified location.
pub(crate) static GROUP_STEP_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^([A-Za-z0-9_]+)(?:\[(\d+)\])?$"));

/// A segment identifier as it appears at the start of an ER7 line.
pub(crate) static SEGMENT_ID_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"^[A-Z0-9]{3}$"));

// ---------------------------------------------------------------------------
// HL7 primitive datatypes
// ---------------------------------------------------------------------------

/// DTM / TS: `YYYY[MM[DD[HH[MM[SS[.S[S[S[S]]]]]]]]][+/-ZZZZ]`.
pub(crate) static DTM_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"^\d{4}(?:(?:0[1-9]|1[0-2])(?:(?:0[1-9]|[12]\d|3[01])(?:(?:[01]\d|2[0-3])(?:[0-5]\d(?:[0-5]\d(?:\.\d{1,4})?)?)?)?)?)?(?:[+-]\d{4})?$",
    )
});

/// DT: `YYYY[MM[DD]]`.
pub(crate) static DT_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"^\d{4}(?:(?:0[1-9]|1[0-2])(?:0[1-9]|[12]\d|3[01])?)?$")
});

/// TM: `HH[MM[SS[.S[S[S[S]]]]]][+/-ZZZZ]`.
pub(crate) static TM_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"^(?:[01]\d|2[0-3])(?:[0-5]\d(?:[0-5]\d(?:\.\d{1,4})?)?)?(?:[+-]\d{4})?$")
});

/// SI: non-negative integer of at most four digits.
pub(crate) static SI_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"^\d{1,4}$"));

/// NM: optionally signed decimal.
pub(crate) static NM_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^[+-]?(?:\d+\.?\d*|\.\d+)$"));

/// TN: `[NN] [(999)]999-9999[X99999][B99999][C any text]`.
pub(crate) static TN_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"^(?:\d{2} )?(?:\(\d{3}\))?\d{3}-\d{4}(?:X\d{1,5})?(?:B\d{1,5})?(?:C.*)?$")
});

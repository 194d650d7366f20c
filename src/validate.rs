//! Row validation and type coercion for normalized chunks.
//!
//! Only the columns present in the file's binding are checked. Invalid rows
//! are dropped and counted; validation itself never fails.

use std::ops::AddAssign;

use serde::Serialize;

use crate::{
    data::Value,
    schema::{CanonicalField, NormalizedChunk},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DropCounts {
    /// Null in a required column (`sg_uf`, `nm_municipio`, `qt_votos`),
    /// including vote counts that were not numeric.
    pub missing_required: usize,
    pub non_positive_votes: usize,
}

impl DropCounts {
    pub fn total(&self) -> usize {
        self.missing_required + self.non_positive_votes
    }
}

impl AddAssign for DropCounts {
    fn add_assign(&mut self, other: Self) {
        self.missing_required += other.missing_required;
        self.non_positive_votes += other.non_positive_votes;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedChunk {
    chunk: NormalizedChunk,
    dropped: DropCounts,
}

impl ValidatedChunk {
    pub fn chunk(&self) -> &NormalizedChunk {
        &self.chunk
    }

    pub fn dropped(&self) -> DropCounts {
        self.dropped
    }

    pub fn len(&self) -> usize {
        self.chunk.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk.is_empty()
    }

    pub fn into_chunk(self) -> NormalizedChunk {
        self.chunk
    }
}

pub fn validate(chunk: NormalizedChunk) -> ValidatedChunk {
    let votes = chunk.position(CanonicalField::QtVotos);
    let required = positions(&chunk, CanonicalField::is_required);
    let integer_coded = positions(&chunk, CanonicalField::is_integer_coded);
    let (fields, rows) = chunk.into_parts();

    let mut dropped = DropCounts::default();
    let mut kept = Vec::with_capacity(rows.len());
    for mut row in rows {
        if let Some(idx) = votes {
            row[idx] = row[idx].take().and_then(|value| value.into_numeric());
        }
        if required.iter().any(|&idx| row[idx].is_none()) {
            dropped.missing_required += 1;
            continue;
        }
        if let Some(idx) = votes {
            if !row[idx].as_ref().is_some_and(|value| value.is_positive()) {
                dropped.non_positive_votes += 1;
                continue;
            }
        }
        for &idx in &integer_coded {
            row[idx] = row[idx]
                .take()
                .and_then(|value| value.to_integer())
                .map(Value::Integer);
        }
        kept.push(row);
    }

    ValidatedChunk {
        chunk: NormalizedChunk::from_parts(fields, kept),
        dropped,
    }
}

fn positions(chunk: &NormalizedChunk, predicate: fn(CanonicalField) -> bool) -> Vec<usize> {
    chunk
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, field)| predicate(**field))
        .map(|(idx, _)| idx)
        .collect()
}

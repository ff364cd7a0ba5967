//! Gap-filling resource sequencer.
//!
//! Resources that already went through provisioning carry an ordinal (their
//! cluster index). Freshly allocated ones do not. The sequencer places every
//! ordinal-tagged resource at its ordinal, fills holes left by rolled-back
//! resources with new resources in name order, then appends whatever new
//! resources remain. A tracking system that assigns ordinals the same way
//! stays in step with the result.
//!
//! ```text
//! tagged {0:a 1:b 2:c 4:e}, new {g f}  =>  [a b c f e g]
//! ```

use std::collections::BTreeMap;

use thiserror::Error;

/// Sequencing failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SequenceError {
    /// Two resources claim the same ordinal.
    #[error("ordinal {ordinal} is claimed by both {first} and {second}")]
    DuplicateOrdinal {
        ordinal: u32,
        first: String,
        second: String,
    },

    /// Not enough new resources to fill the ordinal holes.
    #[error("{holes} ordinal holes but only {available} new resources to fill them")]
    InsufficientNewResources { holes: usize, available: usize },
}

/// One resource as seen by the sequencer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceCandidate {
    pub link: String,
    pub name: String,
    pub ordinal: Option<u32>,
}

impl SequenceCandidate {
    pub fn new(link: impl Into<String>, name: impl Into<String>, ordinal: Option<u32>) -> Self {
        Self {
            link: link.into(),
            name: name.into(),
            ordinal,
        }
    }
}

/// Sequencer output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sequence {
    /// Resource links in their final order.
    pub links: Vec<String>,

    /// How many of `links` carried an ordinal.
    pub tagged: usize,

    /// How many of `links` were new (no ordinal).
    pub untagged: usize,
}

/// Parses a raw ordinal tag.
///
/// Only non-negative integers are valid; anything else means "no ordinal".
pub fn parse_ordinal(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|s| s.trim().parse::<u32>().ok())
}

/// Orders `candidates` as described in the module docs.
///
/// The result does not depend on the order of `candidates`.
pub fn sequence<I>(candidates: I) -> Result<Sequence, SequenceError>
where
    I: IntoIterator<Item = SequenceCandidate>,
{
    let mut tagged: BTreeMap<u32, String> = BTreeMap::new();
    let mut untagged: Vec<(String, String)> = Vec::new();

    for candidate in candidates {
        match candidate.ordinal {
            Some(ordinal) => {
                if let Some(existing) = tagged.get(&ordinal) {
                    // Report the pair in link order so the error is stable too.
                    let (first, second) = if *existing <= candidate.link {
                        (existing.clone(), candidate.link)
                    } else {
                        (candidate.link, existing.clone())
                    };
                    return Err(SequenceError::DuplicateOrdinal {
                        ordinal,
                        first,
                        second,
                    });
                }
                tagged.insert(ordinal, candidate.link);
            }
            None => untagged.push((candidate.name, candidate.link)),
        }
    }

    untagged.sort();

    let slots = tagged.keys().next_back().map_or(0, |max| *max as usize + 1);
    let holes = slots - tagged.len();
    if holes > untagged.len() {
        return Err(SequenceError::InsufficientNewResources {
            holes,
            available: untagged.len(),
        });
    }

    let tagged_count = tagged.len();
    let untagged_count = untagged.len();
    let mut fresh = untagged.into_iter().map(|(_, link)| link);
    let mut links = Vec::with_capacity(tagged_count + untagged_count);

    for ordinal in 0..slots {
        match tagged.remove(&(ordinal as u32)) {
            Some(link) => links.push(link),
            None => {
                if let Some(link) = fresh.next() {
                    links.push(link);
                }
            }
        }
    }
    links.extend(fresh);

    Ok(Sequence {
        links,
        tagged: tagged_count,
        untagged: untagged_count,
    })
}

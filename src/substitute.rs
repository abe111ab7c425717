//! Forward and reverse substitution of literals and tokens

use crate::mapping::Mapping;

/// A piece of text during substitution: either still open for replacement,
/// or already replaced and therefore off-limits to later pairs.
enum Segment<'a> {
    Open(String),
    Done(&'a str),
}

/// Replace every occurrence of each `from` with its `to`, in the order given.
///
/// Each pair works on the output of the previous ones, but never looks inside
/// text an earlier pair inserted, and a match never straddles such text.
fn substitute<'a, I>(text: &str, pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut segments = vec![Segment::Open(text.to_string())];

    for (from, to) in pairs {
        if from.is_empty() {
            continue;
        }
        let hit = segments
            .iter()
            .any(|s| matches!(s, Segment::Open(open) if open.contains(from)));
        if !hit {
            continue;
        }

        let mut next = Vec::with_capacity(segments.len() + 2);
        for segment in segments {
            match segment {
                Segment::Open(open) => split_open(&open, from, to, &mut next),
                done => next.push(done),
            }
        }
        segments = next;
    }

    let mut out = String::with_capacity(text.len());
    for segment in &segments {
        match segment {
            Segment::Open(open) => out.push_str(open),
            Segment::Done(done) => out.push_str(done),
        }
    }
    out
}

fn split_open<'a>(open: &str, from: &str, to: &'a str, out: &mut Vec<Segment<'a>>) {
    let mut last = 0;
    for (start, _) in open.match_indices(from) {
        if start > last {
            out.push(Segment::Open(open[last..start].to_string()));
        }
        out.push(Segment::Done(to));
        last = start + from.len();
    }
    if last < open.len() {
        out.push(Segment::Open(open[last..].to_string()));
    }
}

/// Replace every mapped literal in `text` with its token.
///
/// Literals are applied longest first, so "Tyler Jensen" is replaced as a
/// whole before "Tyler" gets a chance to split it.
pub fn pseudonymize(text: &str, mapping: &Mapping) -> String {
    substitute(
        text,
        mapping
            .iter()
            .map(|e| (e.literal.as_str(), e.token.as_str())),
    )
}

/// Replace every mapped token in `text` with its literal.
///
/// Tokens the mapping does not know about are left as they are.
pub fn depseudonymize(text: &str, mapping: &Mapping) -> String {
    substitute(
        text,
        mapping
            .iter()
            .map(|e| (e.token.as_str(), e.literal.as_str())),
    )
}

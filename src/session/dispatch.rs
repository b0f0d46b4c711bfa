//! Maps inbound search ranges onto region snapshots.
//!
//! Reads never touch the updaters: each request loads whichever snapshot
//! is published when it arrives and works against that view alone.

use crate::oid::Oid;
use crate::pdu::{GetBulkPdu, GetPdu, ResponseError, ResponsePdu, SearchRange};
use crate::value::Value;
use crate::varbind::VarBind;

use super::Region;

/// Regions that can answer for a request context.
fn candidates<'a>(
    regions: &'a [Region],
    context: Option<&'a [u8]>,
) -> impl Iterator<Item = &'a Region> {
    regions
        .iter()
        .filter(move |r| r.registered && r.context_matches(context))
}

/// The region whose subtree contains `oid`, if any. Regions are disjoint,
/// so the first match is the only match.
fn find_region<'a>(
    regions: &'a [Region],
    context: Option<&'a [u8]>,
    oid: &Oid,
) -> Option<&'a Region> {
    candidates(regions, context).find(|r| r.spec.subtree.is_prefix_of(oid))
}

fn context_unsupported(regions: &[Region], context: Option<&[u8]>) -> bool {
    context.is_some() && !regions.iter().any(|r| r.registered && r.context_matches(context))
}

/// Final validation pass over response varbinds.
///
/// A value the codec cannot legally emit turns the whole response into
/// genErr with the 1-based offender index and every value nulled.
fn finish(uptime: u32, varbinds: Vec<VarBind>) -> ResponsePdu {
    for (i, vb) in varbinds.iter().enumerate() {
        if vb.value.validate().is_err() {
            let nulled = varbinds
                .iter()
                .map(|vb| VarBind::new(vb.oid.clone(), Value::Null))
                .collect();
            return ResponsePdu {
                sys_uptime: uptime,
                error: ResponseError::GenErr,
                index: (i + 1) as u16,
                varbinds: nulled,
            };
        }
    }
    ResponsePdu::success(uptime, varbinds)
}

/// Handle an agentx-Get-PDU: exact lookups.
pub(crate) fn get(regions: &[Region], body: &GetPdu, uptime: u32) -> ResponsePdu {
    let context = body.context.as_deref();
    if context_unsupported(regions, context) {
        return ResponsePdu::error(uptime, ResponseError::UnsupportedContext, 0);
    }

    let varbinds = body
        .ranges
        .iter()
        .map(|range| match find_region(regions, context, &range.start) {
            Some(region) => {
                let snapshot = region.snapshot.load();
                match snapshot.get(&range.start) {
                    Some(value) => VarBind::new(range.start.clone(), value.clone()),
                    // Inside the region but not a bound leaf
                    None => VarBind::no_such_instance(range.start.clone()),
                }
            }
            // Not under any region this session serves
            None => VarBind::no_such_object(range.start.clone()),
        })
        .collect();

    finish(uptime, varbinds)
}

/// One GETNEXT step for a single search range.
fn next_binding(regions: &[Region], context: Option<&[u8]>, range: &SearchRange) -> VarBind {
    // A degenerate range (start == end) reduces to an exact lookup with
    // include semantics.
    if !range.end.is_empty() && range.start == range.end {
        if range.include {
            if let Some(region) = find_region(regions, context, &range.start) {
                if let Some(value) = region.snapshot.load().get(&range.start) {
                    return VarBind::new(range.start.clone(), value.clone());
                }
            }
        }
        return VarBind::end_of_mib_view(range.start.clone());
    }

    // Regions are disjoint but a range may span several; take the smallest
    // qualifying successor across all of them.
    let mut best: Option<(Oid, Value)> = None;
    for region in candidates(regions, context) {
        let snapshot = region.snapshot.load();
        if let Some((key, value)) = snapshot.successor(&range.start, range.include) {
            if !range.end.is_empty() && key >= range.end {
                continue;
            }
            if best.as_ref().is_none_or(|(b, _)| key < *b) {
                best = Some((key, value.clone()));
            }
        }
    }

    match best {
        Some((key, value)) => VarBind::new(key, value),
        None => VarBind::end_of_mib_view(range.start.clone()),
    }
}

/// Handle an agentx-GetNext-PDU.
pub(crate) fn get_next(regions: &[Region], body: &GetPdu, uptime: u32) -> ResponsePdu {
    let context = body.context.as_deref();
    if context_unsupported(regions, context) {
        return ResponsePdu::error(uptime, ResponseError::UnsupportedContext, 0);
    }

    let varbinds = body
        .ranges
        .iter()
        .map(|range| next_binding(regions, context, range))
        .collect();

    finish(uptime, varbinds)
}

/// Handle an agentx-GetBulk-PDU.
///
/// The first `non_repeaters` ranges behave like GETNEXT. The rest repeat
/// up to `max_repetitions` times, each with its own cursor, interleaved in
/// round-robin order. A range that reaches endOfMibView emits the marker
/// once and sits out the remaining repetitions.
pub(crate) fn get_bulk(regions: &[Region], body: &GetBulkPdu, uptime: u32) -> ResponsePdu {
    let context = body.context.as_deref();
    if context_unsupported(regions, context) {
        return ResponsePdu::error(uptime, ResponseError::UnsupportedContext, 0);
    }

    let n = (body.non_repeaters as usize).min(body.ranges.len());
    let mut varbinds = Vec::new();

    for range in &body.ranges[..n] {
        varbinds.push(next_binding(regions, context, range));
    }

    let mut cursors: Vec<SearchRange> = body.ranges[n..].to_vec();
    let mut exhausted = vec![false; cursors.len()];

    for _ in 0..body.max_repetitions {
        if exhausted.iter().all(|&done| done) {
            break;
        }
        for (i, cursor) in cursors.iter_mut().enumerate() {
            if exhausted[i] {
                continue;
            }
            let vb = next_binding(regions, context, cursor);
            if matches!(vb.value, Value::EndOfMibView) {
                exhausted[i] = true;
            } else {
                *cursor = SearchRange::new(vb.oid.clone(), cursor.end.clone(), false);
            }
            varbinds.push(vb);
        }
    }

    finish(uptime, varbinds)
}

//! Activity feed call parser.
//!
//! Produces a fresh snapshot of `CallRecord`s on every call; nothing is
//! retained between scans.

use lazy_static::lazy_static;
use regex::Regex;

use crate::config::Selectors;
use crate::dom::{HostDocument, NodeId};
use crate::logging::structured::LogContext;
use crate::models::{CallDirection, CallRecord};

lazy_static! {
    /// Inbound header: "от: 79639588178 кому:"
    static ref FROM_PHONE_PATTERN: Regex = Regex::new(
        r"(?i)от:\s*([+\d\s-]+)"
    ).unwrap();

    /// Outbound header: "кому: 9167102"
    static ref TO_PHONE_PATTERN: Regex = Regex::new(
        r"(?i)кому:\s*([+\d\s-]+)"
    ).unwrap();
}

const DEFAULT_DURATION: &str = "00:00:00";

/// Extract every call entry currently rendered in the document.
///
/// Entries without a host id are skipped: they can be neither addressed nor
/// decorated. Entries without a permanent link are kept with
/// `permanent_link = None`.
pub fn extract_calls<D: HostDocument + ?Sized>(
    doc: &D,
    selectors: &Selectors,
    ctx: &LogContext,
) -> Vec<CallRecord> {
    let nodes = doc.query_by_class(&selectors.call_entry);

    log::debug!(
        "{} EXTRACT_START elements={} selector={}",
        ctx,
        nodes.len(),
        selectors.call_entry
    );

    let mut calls = Vec::with_capacity(nodes.len());
    for node in nodes {
        match extract_call(doc, selectors, node) {
            Some(call) => {
                log::debug!(
                    "{} CALL_EXTRACTED direction={} has_link={} has_phone={}",
                    ctx.with_call(&call.id),
                    call.direction.as_str(),
                    call.permanent_link.is_some(),
                    call.phone.is_some()
                );
                calls.push(call);
            }
            None => {
                log::warn!("{} CALL_WITHOUT_ID node={}", ctx, node);
            }
        }
    }

    log::info!(
        "{} EXTRACT_COMPLETE calls={} with_link={}",
        ctx,
        calls.len(),
        calls.iter().filter(|c| c.has_link()).count()
    );

    calls
}

/// Extract a single entry. Returns `None` only when the host id is missing.
pub fn extract_call<D: HostDocument + ?Sized>(
    doc: &D,
    selectors: &Selectors,
    node: NodeId,
) -> Option<CallRecord> {
    let id = doc
        .attribute(node, "data-id")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())?;

    let direction = if doc
        .find_descendant_by_class(node, &selectors.direction_out)
        .is_some()
    {
        CallDirection::Outbound
    } else {
        CallDirection::Inbound
    };

    let phone = child_text(doc, node, &selectors.header).and_then(|t| parse_phone(&t));

    let status_text = doc
        .find_descendant_by_class(node, &selectors.status)
        .and_then(|status| doc.find_descendant_by_tag(status, "b"))
        .and_then(|b| doc.text_content(b))
        .map(|t| t.trim().to_string())
        .unwrap_or_default();

    let operator = doc.find_descendant_by_class(node, &selectors.operator);
    let operator_id = operator
        .and_then(|op| doc.attribute(op, "data-id"))
        .unwrap_or_default();
    let operator_name = operator
        .and_then(|op| doc.text_content(op))
        .map(|t| t.trim().to_string())
        .unwrap_or_default();

    let player = doc.find_descendant_by_class(node, &selectors.player_link);
    let permanent_link = player
        .and_then(|p| doc.attribute(p, "href"))
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty());
    let provider_tag = player
        .and_then(|p| doc.attribute(p, "data-prepare"))
        .filter(|tag| !tag.is_empty());

    let date_text = child_text(doc, node, &selectors.date).unwrap_or_default();
    let duration_text = child_text(doc, node, &selectors.duration)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_DURATION.to_string());

    Some(CallRecord {
        id,
        permanent_link,
        direction,
        date_text,
        duration_text,
        phone,
        operator_id,
        operator_name,
        status_text,
        provider_tag,
    })
}

/// Pull the counterpart number out of a call header.
///
/// "от:" (inbound) wins over "кому:" (outbound) when both are present.
pub fn parse_phone(header: &str) -> Option<String> {
    [&*FROM_PHONE_PATTERN, &*TO_PHONE_PATTERN]
        .iter()
        .filter_map(|pattern| pattern.captures(header))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
        .find(|phone| !phone.is_empty())
}

fn child_text<D: HostDocument + ?Sized>(doc: &D, node: NodeId, class: &str) -> Option<String> {
    doc.find_descendant_by_class(node, class)
        .and_then(|child| doc.text_content(child))
        .map(|t| t.trim().to_string())
}

//! Non-destructive hide/show decoration of call entries.
//!
//! Hiding a call sets its inline `display` to `none` and shows a placeholder
//! inserted right before it. The placeholder carries a "show" button; the
//! call element gets a "hide" button prepended for the reverse action.
//! Decorations are allocated lazily on first hide and kept on show, so
//! toggling a call back and forth never re-injects markup.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::{Labels, Selectors};
use crate::dom::{HostDocument, NodeId};
use crate::error::DomError;

/// What a decoration control asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Show,
    Hide,
}

/// Nodes injected for one decorated call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecorationRecord {
    pub call_element: NodeId,
    pub placeholder: NodeId,
    pub show_button: NodeId,
    pub hide_button: NodeId,
    /// Inline `display` of the call element before the first hide.
    pub original_display: String,
    pub hidden: bool,
}

/// Where the call element of a record is now.
enum Target {
    Live,
    /// The host re-rendered the entry; the new element has the same id.
    Remounted(NodeId),
    Gone,
}

pub struct VisibilityDecorator<D: HostDocument> {
    document: Arc<Mutex<D>>,
    selectors: Selectors,
    labels: Labels,
    records: Mutex<HashMap<String, DecorationRecord>>,
}

impl<D: HostDocument> VisibilityDecorator<D> {
    pub fn new(document: Arc<Mutex<D>>, selectors: Selectors, labels: Labels) -> Self {
        Self {
            document,
            selectors,
            labels,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Hide every call in `ids`. Returns how many calls are now hidden.
    ///
    /// Ids whose element is not in the document are skipped, and their
    /// placeholder, if any, is removed with the record.
    pub fn hide(&self, ids: &HashSet<String>) -> usize {
        let mut records = self.records.lock();
        let mut doc = self.document.lock();
        let mut hidden = 0;

        for id in ids {
            if let Some(record) = records.get(id) {
                match self.locate(&*doc, id, record) {
                    Target::Live => {}
                    Target::Remounted(_) => {
                        log::debug!("DECORATION_REMOUNTED call={}", id);
                        if let Some(stale) = records.remove(id) {
                            discard(&mut *doc, &stale);
                        }
                    }
                    Target::Gone => {
                        log::debug!("DECORATION_TARGET_MISSING call={} op=hide", id);
                        if let Some(stale) = records.remove(id) {
                            discard(&mut *doc, &stale);
                        }
                        continue;
                    }
                }
            }

            if !records.contains_key(id) {
                let Some(element) = doc.find_call_element(&self.selectors.call_entry, id) else {
                    log::debug!("DECORATION_TARGET_MISSING call={} op=hide", id);
                    continue;
                };
                match self.decorate(&mut *doc, id, element) {
                    Ok(record) => {
                        records.insert(id.clone(), record);
                    }
                    Err(e) => {
                        log::warn!("DECORATION_FAILED call={} error={}", id, e);
                        continue;
                    }
                }
            }

            if let Some(record) = records.get_mut(id) {
                match apply_hidden(&mut *doc, record) {
                    Ok(()) => hidden += 1,
                    Err(e) => log::debug!("DECORATION_TARGET_MISSING call={} error={}", id, e),
                }
            }
        }

        log::debug!("CALLS_HIDDEN requested={} hidden={}", ids.len(), hidden);
        hidden
    }

    /// Reveal every call in `ids`. Calls never hidden are left alone.
    /// Returns how many calls are now shown.
    pub fn show(&self, ids: &HashSet<String>) -> usize {
        let mut records = self.records.lock();
        let mut doc = self.document.lock();
        let mut shown = 0;

        for id in ids {
            let Some(record) = records.get(id) else {
                continue;
            };
            match self.locate(&*doc, id, record) {
                Target::Live => {}
                Target::Remounted(_) => {
                    // The fresh element was never hidden.
                    if let Some(stale) = records.remove(id) {
                        discard(&mut *doc, &stale);
                    }
                    continue;
                }
                Target::Gone => {
                    log::debug!("DECORATION_TARGET_MISSING call={} op=show", id);
                    if let Some(stale) = records.remove(id) {
                        discard(&mut *doc, &stale);
                    }
                    continue;
                }
            }

            if let Some(record) = records.get_mut(id) {
                match apply_shown(&mut *doc, record) {
                    Ok(()) => shown += 1,
                    Err(e) => log::debug!("DECORATION_TARGET_MISSING call={} error={}", id, e),
                }
            }
        }

        log::debug!("CALLS_SHOWN requested={} shown={}", ids.len(), shown);
        shown
    }

    /// Restore every tracked call and remove all injected markup.
    /// Returns how many decorations were removed.
    pub fn show_all(&self) -> usize {
        let mut records = self.records.lock();
        let mut doc = self.document.lock();
        let count = records.len();

        for (id, record) in records.drain() {
            if let Err(e) = doc.set_display(record.call_element, &record.original_display) {
                log::debug!("DECORATION_TARGET_MISSING call={} error={}", id, e);
            }
            discard(&mut *doc, &record);
        }

        if count > 0 {
            log::info!("DECORATIONS_CLEARED count={}", count);
        }
        count
    }

    pub fn is_hidden(&self, id: &str) -> bool {
        self.records
            .lock()
            .get(id)
            .map(|r| r.hidden)
            .unwrap_or(false)
    }

    pub fn hidden_ids(&self) -> HashSet<String> {
        self.records
            .lock()
            .iter()
            .filter(|(_, r)| r.hidden)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn record(&self, id: &str) -> Option<DecorationRecord> {
        self.records.lock().get(id).cloned()
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().len()
    }

    /// Dispatch a click on one of the injected controls.
    ///
    /// Returns the call id and the action taken, or `None` when `node` is not
    /// part of any decoration.
    pub fn handle_control_click(&self, node: NodeId) -> Option<(String, ControlAction)> {
        let (id, action) = {
            let records = self.records.lock();
            let doc = self.document.lock();
            records.iter().find_map(|(id, r)| {
                if doc.contains(r.show_button, node) {
                    Some((id.clone(), ControlAction::Show))
                } else if doc.contains(r.hide_button, node) {
                    Some((id.clone(), ControlAction::Hide))
                } else {
                    None
                }
            })?
        };

        log::info!("CONTROL_CLICKED call={} action={:?}", id, action);
        let ids = HashSet::from([id.clone()]);
        match action {
            ControlAction::Show => self.show(&ids),
            ControlAction::Hide => self.hide(&ids),
        };
        Some((id, action))
    }

    fn locate(&self, doc: &D, id: &str, record: &DecorationRecord) -> Target {
        if doc.is_connected(record.call_element) {
            return Target::Live;
        }
        match doc.find_call_element(&self.selectors.call_entry, id) {
            Some(element) if element != record.call_element => Target::Remounted(element),
            _ => Target::Gone,
        }
    }

    fn decorate(&self, doc: &mut D, id: &str, element: NodeId) -> Result<DecorationRecord, DomError> {
        let parent = doc.parent(element).ok_or(DomError::NoParent(element))?;
        let original_display = doc.display(element).ok_or(DomError::NodeMissing(element))?;

        let placeholder = doc.create_element("div", &self.selectors.placeholder);
        doc.set_attribute(placeholder, "data-call-id", id)?;

        let label = doc.create_element("span", "");
        doc.set_text(label, &self.labels.placeholder)?;
        doc.append_child(placeholder, label)?;

        let show_button = doc.create_element("button", &self.selectors.placeholder_button);
        doc.set_attribute(show_button, "type", "button")?;
        doc.set_text(show_button, &self.labels.show_button)?;
        doc.append_child(placeholder, show_button)?;

        let hide_button = doc.create_element("button", &self.selectors.hide_button);
        doc.set_attribute(hide_button, "type", "button")?;
        doc.set_text(hide_button, &self.labels.hide_button)?;
        doc.set_display(hide_button, "none")?;

        doc.insert_before(parent, placeholder, element)?;
        if let Err(e) = doc.prepend_child(element, hide_button) {
            // No record will own the placeholder.
            let _ = doc.remove(placeholder);
            return Err(e);
        }

        log::debug!("DECORATION_CREATED call={} placeholder={}", id, placeholder);

        Ok(DecorationRecord {
            call_element: element,
            placeholder,
            show_button,
            hide_button,
            original_display,
            hidden: false,
        })
    }
}

fn apply_hidden<D: HostDocument>(doc: &mut D, record: &mut DecorationRecord) -> Result<(), DomError> {
    doc.set_display(record.call_element, "none")?;
    doc.set_display(record.placeholder, "")?;
    doc.set_display(record.hide_button, "none")?;
    record.hidden = true;
    Ok(())
}

fn apply_shown<D: HostDocument>(doc: &mut D, record: &mut DecorationRecord) -> Result<(), DomError> {
    doc.set_display(record.call_element, &record.original_display)?;
    doc.set_display(record.placeholder, "none")?;
    doc.set_display(record.hide_button, "")?;
    record.hidden = false;
    Ok(())
}

/// Remove the injected nodes of a record. Missing nodes are ignored.
fn discard<D: HostDocument>(doc: &mut D, record: &DecorationRecord) {
    let _ = doc.remove(record.placeholder);
    let _ = doc.remove(record.hide_button);
}

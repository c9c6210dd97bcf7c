use std::sync::Arc;

use crate::identity::{LOCAL_ID_MASK, RecordIdentity};
use crate::record::{Category, FieldValue, Record, Reference};
use crate::store::RecordStore;

use super::{LinkResolver, ResolveTrail};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    SelfResolve,
    IdentityExtraction,
    RawShape,
    ExpectedCategory,
    BroadScan,
    LastResort,
}

/// Why a strategy that applied to a reference could not finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    MalformedIdentity,
    UnknownOwner,
    MissingVia,
    MissingForwardField,
    ForwardFieldNotLink,
}

pub(crate) enum StrategyResult {
    Resolved(Arc<Record>),
    /// The reference's shape is not something this strategy handles.
    NotApplicable,
    /// Applicable, but nothing in the store matched.
    Miss,
    Failed(FailureClass),
}

impl StrategyResult {
    fn from_lookup(found: Option<Arc<Record>>) -> Self {
        match found {
            Some(record) => Self::Resolved(record),
            None => Self::Miss,
        }
    }
}

pub(crate) trait ResolveStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn try_resolve(
        &self,
        resolver: &LinkResolver<'_>,
        reference: &Reference,
        expected: Option<&Category>,
        trail: &mut ResolveTrail,
    ) -> StrategyResult;
}

/// The fixed order every request walks; the first hit short-circuits.
pub(crate) fn default_chain() -> Vec<Box<dyn ResolveStrategy>> {
    vec![
        Box::new(SelfResolve),
        Box::new(IdentityExtraction),
        Box::new(RawShape),
        Box::new(ExpectedCategory),
        Box::new(BroadScan),
        Box::new(LastResort),
    ]
}

/// Shapes that know how to look themselves up: typed links against their
/// declared category, forwarding links by following the named field.
struct SelfResolve;

impl ResolveStrategy for SelfResolve {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SelfResolve
    }

    fn try_resolve(
        &self,
        resolver: &LinkResolver<'_>,
        reference: &Reference,
        expected: Option<&Category>,
        trail: &mut ResolveTrail,
    ) -> StrategyResult {
        match reference {
            Reference::Typed { identity, category } => {
                StrategyResult::from_lookup(resolver.store().resolve(identity, Some(category)))
            }
            Reference::Forward { via, field } => {
                let Some(via_record) = resolver.resolve_identity_with(via, trail) else {
                    return StrategyResult::Failed(FailureClass::MissingVia);
                };
                let Some(value) = via_record.field(field) else {
                    return StrategyResult::Failed(FailureClass::MissingForwardField);
                };
                let FieldValue::Link(next) = value else {
                    return StrategyResult::Failed(FailureClass::ForwardFieldNotLink);
                };
                StrategyResult::from_lookup(resolver.resolve_with(next, expected, trail))
            }
            _ => StrategyResult::NotApplicable,
        }
    }
}

struct IdentityExtraction;

impl ResolveStrategy for IdentityExtraction {
    fn kind(&self) -> StrategyKind {
        StrategyKind::IdentityExtraction
    }

    fn try_resolve(
        &self,
        resolver: &LinkResolver<'_>,
        reference: &Reference,
        _expected: Option<&Category>,
        _trail: &mut ResolveTrail,
    ) -> StrategyResult {
        match reference.identity() {
            Ok(Some(identity)) => {
                StrategyResult::from_lookup(resolver.store().resolve(&identity, None))
            }
            Ok(None) => StrategyResult::NotApplicable,
            Err(_) => StrategyResult::Failed(FailureClass::MalformedIdentity),
        }
    }
}

struct RawShape;

impl ResolveStrategy for RawShape {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RawShape
    }

    fn try_resolve(
        &self,
        resolver: &LinkResolver<'_>,
        reference: &Reference,
        _expected: Option<&Category>,
        _trail: &mut ResolveTrail,
    ) -> StrategyResult {
        let Reference::Raw { owner, form_id } = reference else {
            return StrategyResult::NotApplicable;
        };
        if owner.trim().is_empty() {
            return StrategyResult::Failed(FailureClass::UnknownOwner);
        }
        StrategyResult::from_lookup(resolver.store().resolve_raw(owner, *form_id))
    }
}

/// Retries identity lookup constrained to the category the caller expects.
/// Raw ids fall back to the owner plugin as the declaring plugin.
struct ExpectedCategory;

impl ResolveStrategy for ExpectedCategory {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ExpectedCategory
    }

    fn try_resolve(
        &self,
        resolver: &LinkResolver<'_>,
        reference: &Reference,
        expected: Option<&Category>,
        _trail: &mut ResolveTrail,
    ) -> StrategyResult {
        let Some(expected) = expected else {
            return StrategyResult::NotApplicable;
        };
        let Some(identity) = scan_identity(resolver.store(), reference) else {
            return StrategyResult::NotApplicable;
        };
        StrategyResult::from_lookup(resolver.store().resolve(&identity, Some(expected)))
    }
}

/// Walks every category looking for an identity or editor-id match.
struct BroadScan;

impl ResolveStrategy for BroadScan {
    fn kind(&self) -> StrategyKind {
        StrategyKind::BroadScan
    }

    fn try_resolve(
        &self,
        resolver: &LinkResolver<'_>,
        reference: &Reference,
        _expected: Option<&Category>,
        _trail: &mut ResolveTrail,
    ) -> StrategyResult {
        let identity = scan_identity(resolver.store(), reference);
        let editor_id = match reference {
            Reference::EditorId(editor_id) | Reference::Key(editor_id) => Some(editor_id.as_str()),
            _ => None,
        };
        if identity.is_none() && editor_id.is_none() {
            return StrategyResult::NotApplicable;
        }

        for (_, records) in resolver.store().all_categories() {
            let hit = records.into_iter().find(|record| {
                identity.as_ref().is_some_and(|id| record.identity == *id)
                    || editor_id.is_some_and(|wanted| {
                        record
                            .editor_id
                            .as_deref()
                            .is_some_and(|have| have.eq_ignore_ascii_case(wanted))
                    })
            });
            if let Some(record) = hit {
                return StrategyResult::Resolved(record);
            }
        }
        StrategyResult::Miss
    }
}

/// Single-argument store entry points, for stores that index more than
/// they enumerate.
struct LastResort;

impl ResolveStrategy for LastResort {
    fn kind(&self) -> StrategyKind {
        StrategyKind::LastResort
    }

    fn try_resolve(
        &self,
        resolver: &LinkResolver<'_>,
        reference: &Reference,
        _expected: Option<&Category>,
        _trail: &mut ResolveTrail,
    ) -> StrategyResult {
        match reference {
            Reference::EditorId(text) | Reference::Key(text) => {
                StrategyResult::from_lookup(resolver.store().resolve_editor_id(text))
            }
            _ => StrategyResult::NotApplicable,
        }
    }
}

/// The identity a reference names. A raw id the store cannot decode is read
/// as declared by its owner.
fn scan_identity(store: &dyn RecordStore, reference: &Reference) -> Option<RecordIdentity> {
    if let Ok(Some(identity)) = reference.decode(store) {
        return Some(identity);
    }
    match reference {
        Reference::Raw { owner, form_id } => {
            RecordIdentity::new(owner.as_str(), form_id & LOCAL_ID_MASK).ok()
        }
        _ => None,
    }
}

//! Active-tenant resolution.
//!
//! The tenant in focus lives in two places at once: the navigable location
//! (`?company=<id>`, so a selection survives reloads and can be shared) and
//! the in-memory session state. The two must never disagree, so every
//! transition goes through this module and the tie-break is defined once:
//! the location wins on navigation, the first company by ascending name
//! wins on a cold start with no location hint.

use uuid::Uuid;

/// Minimal view of a company needed for selection decisions.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CompanyRef {
    pub id: Uuid,
    pub name: String,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Selection {
    /// The company list loaded empty.
    NoTenants,
    /// Companies may exist but none is chosen; also the initial state.
    #[default]
    Unselected,
    Selected(Uuid),
}

impl Selection {
    pub fn tenant(self) -> Option<Uuid> {
        match self {
            Selection::Selected(id) => Some(id),
            _ => None,
        }
    }

    /// Whether results fetched for `tenant` may still be applied. In-flight
    /// responses keyed to a company that is no longer active are dropped,
    /// never shown under the new context.
    pub fn accepts(self, tenant: Uuid) -> bool {
        self == Selection::Selected(tenant)
    }

    /// Sign-out: back to the initial state. Callers discard every cached
    /// company and credential list at the same time so nothing leaks into
    /// the next account's session.
    pub fn reset() -> Self {
        Selection::Unselected
    }
}

/// How the navigable location must change to stay in sync.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LocationUpdate {
    /// Location already agrees; leave it alone.
    None,
    /// Drop the company parameter.
    Clear,
    /// Rewrite the current history entry (adoption must not pollute
    /// back-navigation).
    Replace(Uuid),
    /// Add a history entry (a deliberate user navigation).
    Push(Uuid),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Resolution {
    pub selection: Selection,
    pub location: LocationUpdate,
}

/// Company-list load completed: adopt a selection.
///
/// Order of precedence: a valid location hint, then a still-valid prior
/// selection, then the first company by ascending name.
pub fn resolve(prior: Selection, companies: &[CompanyRef], hint: Option<Uuid>) -> Resolution {
    if companies.is_empty() {
        return Resolution {
            selection: Selection::NoTenants,
            location: if hint.is_some() {
                LocationUpdate::Clear
            } else {
                LocationUpdate::None
            },
        };
    }

    if let Some(id) = hint {
        if contains(companies, id) {
            return Resolution {
                selection: Selection::Selected(id),
                location: LocationUpdate::None,
            };
        }
    }

    if let Selection::Selected(id) = prior {
        if contains(companies, id) {
            return Resolution {
                selection: prior,
                location: LocationUpdate::Replace(id),
            };
        }
    }

    let adopted = first_by_name(companies);
    Resolution {
        selection: Selection::Selected(adopted),
        location: LocationUpdate::Replace(adopted),
    }
}

/// Explicit pick from a company switcher. `None` if the id is not in the
/// accessible set.
pub fn select(companies: &[CompanyRef], id: Uuid) -> Option<Resolution> {
    contains(companies, id).then_some(Resolution {
        selection: Selection::Selected(id),
        location: LocationUpdate::Push(id),
    })
}

/// The active company disappeared (deleted elsewhere): re-run adoption
/// against the refreshed list.
pub fn on_company_removed(current: Selection, companies: &[CompanyRef]) -> Resolution {
    resolve(current, companies, None)
}

fn contains(companies: &[CompanyRef], id: Uuid) -> bool {
    companies.iter().any(|c| c.id == id)
}

fn first_by_name(companies: &[CompanyRef]) -> Uuid {
    companies
        .iter()
        .min_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)))
        .map(|c| c.id)
        .expect("caller checked companies is non-empty")
}

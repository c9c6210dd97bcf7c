use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::RecordIdentity;
use crate::record::Category;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    Recipe,
    /// Found by the reverse-reference scan; carries the referencing record's category.
    Reference(Category),
}

impl CandidateKind {
    pub fn name(&self) -> String {
        match self {
            Self::Recipe => "recipe".to_string(),
            Self::Reference(category) => category.signature().to_string(),
        }
    }
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Where a confirmed change should be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedTarget {
    WeaponAmmo,
    Review,
}

impl SuggestedTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WeaponAmmo => "weapon.ammo",
            Self::Review => "review",
        }
    }
}

impl fmt::Display for SuggestedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A hypothesis that some record changes which ammunition a weapon fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub kind: CandidateKind,
    pub identity: RecordIdentity,
    pub label: String,
    pub base_weapon: Option<RecordIdentity>,
    pub base_weapon_label: Option<String>,
    pub ammo: Option<RecordIdentity>,
    pub ammo_label: Option<String>,
    pub source_plugin: String,
    pub notes: String,
    pub suggested_target: SuggestedTarget,
    pub confirmed: bool,
    /// Never empty: explains the current confirmation state either way.
    pub confirm_reason: String,
}

impl Candidate {
    pub fn new(
        kind: CandidateKind,
        identity: RecordIdentity,
        label: impl Into<String>,
        source_plugin: impl Into<String>,
    ) -> Self {
        let kind_name = kind.name();
        Self {
            kind,
            identity,
            label: label.into(),
            base_weapon: None,
            base_weapon_label: None,
            ammo: None,
            ammo_label: None,
            source_plugin: source_plugin.into(),
            notes: String::new(),
            suggested_target: SuggestedTarget::Review,
            confirmed: false,
            confirm_reason: format!("unconfirmed: raw {kind_name} candidate"),
        }
    }

    pub fn with_base_weapon(mut self, identity: RecordIdentity, label: impl Into<String>) -> Self {
        self.base_weapon = Some(identity);
        self.base_weapon_label = Some(label.into());
        self.suggested_target = SuggestedTarget::WeaponAmmo;
        self
    }

    pub fn with_ammo(mut self, identity: RecordIdentity, label: impl Into<String>) -> Self {
        self.ammo = Some(identity);
        self.ammo_label = Some(label.into());
        self
    }

    pub fn with_note(mut self, note: &str) -> Self {
        self.add_note(note);
        self
    }

    pub fn add_note(&mut self, note: &str) {
        if note.is_empty() {
            return;
        }
        if !self.notes.is_empty() {
            self.notes.push_str("; ");
        }
        self.notes.push_str(note);
    }

    /// Marks the candidate confirmed. Returns `false` and changes nothing if
    /// an earlier confirmer already claimed it.
    pub fn confirm(&mut self, evidence: Confirmation) -> bool {
        if self.confirmed {
            return false;
        }
        if self.base_weapon.is_none()
            && let Some((weapon, label)) = evidence.base_weapon
        {
            self.base_weapon = Some(weapon);
            self.base_weapon_label = Some(label);
        }
        self.ammo = Some(evidence.ammo);
        self.ammo_label = Some(evidence.ammo_label);
        self.confirmed = true;
        self.suggested_target = SuggestedTarget::WeaponAmmo;
        self.confirm_reason = evidence.reason;
        true
    }

    /// Records why a confirmer passed on this candidate. Ignored once confirmed.
    pub fn decline(&mut self, reason: impl Into<String>) {
        if self.confirmed {
            return;
        }
        let reason = reason.into();
        if !reason.is_empty() {
            self.confirm_reason = reason;
        }
    }

    pub fn dedup_key(&self) -> (RecordIdentity, Option<RecordIdentity>) {
        (self.identity.clone(), self.base_weapon.clone())
    }
}

/// Evidence a confirmer attaches when it confirms a candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Confirmation {
    pub base_weapon: Option<(RecordIdentity, String)>,
    pub ammo: RecordIdentity,
    pub ammo_label: String,
    pub reason: String,
}

//! # Revision Requests
//!
//! A revision request proposes a change set on a document that has left
//! the directly editable statuses. Every counterpart company named on the
//! document must approve it:
//!
//! ```text
//!             ┌──any refusal──▶ REFUSED
//! PENDING ────┼──last approval──▶ ACCEPTED ──(applied once)──▶ appliedAt set
//!             └──author cancels──▶ CANCELED
//! ```
//!
//! Emitter and eco-organisme speak for the same producer: an approval from
//! one of them is recorded for the other as an automatic approval.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use td_core::{Bsd, BsdId, BsdType, Delta, Party, PartyRole, RevisionRequestId, Siret};

use crate::error::RevisionError;

pub const AUTO_APPROVAL_COMMENT: &str = "Auto approval";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RevisionStatus {
    Pending,
    Accepted,
    Refused,
    Canceled,
}

impl RevisionStatus {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for RevisionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Accepted => "ACCEPTED",
            Self::Refused => "REFUSED",
            Self::Canceled => "CANCELED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,
    Accepted,
    Refused,
    Canceled,
}

/// One required approver and its answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    pub approver_siret: Siret,
    pub role: PartyRole,
    pub status: ApprovalStatus,
    pub comment: Option<String>,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl Approval {
    fn pending(party: Party) -> Self {
        Self {
            approver_siret: party.siret,
            role: party.role,
            status: ApprovalStatus::Pending,
            comment: None,
            decided_by: None,
            decided_at: None,
        }
    }

    fn decide(&mut self, status: ApprovalStatus, comment: Option<String>, by: &str, at: DateTime<Utc>) {
        self.status = status;
        self.comment = comment;
        self.decided_by = Some(by.to_string());
        self.decided_at = Some(at);
    }
}

/// Result of recording one approver's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request was vetoed.
    Refused,
    /// Approved, other approvers still pending.
    Pending { remaining: usize },
    /// This answer completed the quorum: the request must be applied.
    Quorum,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionRequest {
    pub id: RevisionRequestId,
    pub bsd_id: BsdId,
    pub bsd_type: BsdType,
    pub author_siret: Siret,
    /// Proposed field values, in the document's JSON field names.
    pub content: Delta,
    /// The request asks for the document to be canceled.
    pub is_canceled: bool,
    pub comment: Option<String>,
    pub approvals: Vec<Approval>,
    pub status: RevisionStatus,
    pub created_at: DateTime<Utc>,
    pub applied_at: Option<DateTime<Utc>>,
}

impl RevisionRequest {
    pub fn new(
        bsd_type: BsdType,
        bsd_id: BsdId,
        author_siret: Siret,
        content: Delta,
        is_canceled: bool,
        comment: Option<String>,
        approvers: Vec<Party>,
    ) -> Self {
        Self {
            id: RevisionRequestId::new(),
            bsd_id,
            bsd_type,
            author_siret,
            content,
            is_canceled,
            comment,
            approvals: approvers.into_iter().map(Approval::pending).collect(),
            status: RevisionStatus::Pending,
            created_at: Utc::now(),
            applied_at: None,
        }
    }

    /// Approvals still awaiting an answer.
    pub fn remaining(&self) -> usize {
        self.approvals
            .iter()
            .filter(|a| a.status == ApprovalStatus::Pending)
            .count()
    }

    pub fn approval(&self, siret: &Siret) -> Option<&Approval> {
        self.approvals.iter().find(|a| &a.approver_siret == siret)
    }

    /// Whether this pending request and a new proposal would change the
    /// same thing. A cancellation overlaps with everything.
    pub fn overlaps(&self, content: &Delta, is_canceled: bool) -> bool {
        self.is_canceled || is_canceled || content.keys().any(|k| self.content.contains_key(k))
    }

    fn ensure_pending(&self) -> Result<(), RevisionError> {
        if self.status.is_resolved() {
            return Err(RevisionError::AlreadyResolved {
                id: self.id.to_string(),
                status: self.status.to_string(),
            });
        }
        Ok(())
    }

    /// Record `siret`'s answer. A refusal resolves the request at once; the
    /// last approval resolves it as accepted.
    pub fn record_decision(
        &mut self,
        siret: &Siret,
        approved: bool,
        comment: Option<String>,
        decided_by: &str,
        at: DateTime<Utc>,
    ) -> Result<Decision, RevisionError> {
        self.ensure_pending()?;
        let id = self.id.to_string();
        let approval = self
            .approvals
            .iter_mut()
            .find(|a| &a.approver_siret == siret)
            .ok_or_else(|| RevisionError::NotApprover {
                id: id.clone(),
                siret: siret.to_string(),
            })?;
        if approval.status != ApprovalStatus::Pending {
            return Err(RevisionError::AlreadyDecided {
                id,
                siret: siret.to_string(),
            });
        }

        if !approved {
            approval.decide(ApprovalStatus::Refused, comment, decided_by, at);
            self.status = RevisionStatus::Refused;
            return Ok(Decision::Refused);
        }

        approval.decide(ApprovalStatus::Accepted, comment, decided_by, at);
        if approval.role.is_producer_side() {
            for linked in self
                .approvals
                .iter_mut()
                .filter(|a| a.role.is_producer_side() && a.status == ApprovalStatus::Pending)
            {
                linked.decide(
                    ApprovalStatus::Accepted,
                    Some(AUTO_APPROVAL_COMMENT.to_string()),
                    "system",
                    at,
                );
            }
        }

        match self.remaining() {
            0 => {
                self.status = RevisionStatus::Accepted;
                Ok(Decision::Quorum)
            }
            remaining => Ok(Decision::Pending { remaining }),
        }
    }

    /// Withdraw the request. Only its author may do so, while pending.
    pub fn cancel(&mut self, by: &Siret) -> Result<(), RevisionError> {
        if by != &self.author_siret {
            return Err(RevisionError::NotAuthor {
                id: self.id.to_string(),
                siret: by.to_string(),
            });
        }
        self.ensure_pending()?;
        self.status = RevisionStatus::Canceled;
        for approval in &mut self.approvals {
            if approval.status == ApprovalStatus::Pending {
                approval.status = ApprovalStatus::Canceled;
            }
        }
        Ok(())
    }
}

/// Companies whose approval a revision by `author` requires.
///
/// Only parties holding one of `eligible` roles take part. The author's own
/// roles are excluded, and when the author is on the producer side the
/// other producer-side party is excluded too. A company appears once even
/// if it holds several roles.
pub fn required_approvers<T: Bsd>(
    document: &T,
    author: &Siret,
    eligible: &[PartyRole],
) -> Result<Vec<Party>, RevisionError> {
    let parties: Vec<Party> = document
        .parties()
        .into_iter()
        .filter(|p| eligible.contains(&p.role))
        .collect();
    let author_roles: Vec<PartyRole> = parties
        .iter()
        .filter(|p| &p.siret == author)
        .map(|p| p.role)
        .collect();
    if author_roles.is_empty() {
        return Err(RevisionError::NotAParty {
            siret: author.to_string(),
        });
    }
    let author_is_producer = author_roles.iter().any(PartyRole::is_producer_side);

    let mut approvers: Vec<Party> = Vec::new();
    for party in parties {
        let excluded = &party.siret == author || (author_is_producer && party.role.is_producer_side());
        if !excluded && !approvers.iter().any(|a| a.siret == party.siret) {
            approvers.push(party);
        }
    }
    Ok(approvers)
}

//! How the service drives each document type: blank record, direct
//! edition window and signature event shape.

use td_core::BsdId;
use td_revision::Revisable;
use td_state::{Bsda, BsdaStatus, Bsdasri, BsdasriStatus, BsddStatus, Form};

pub trait ManagedDocument: Revisable {
    /// A signature is recorded as an `Updated` event carrying the written
    /// fields followed by a `Signed` event carrying the status. When
    /// `false`, a single `Signed` event carries everything.
    const SPLIT_SIGNATURE_EVENTS: bool;

    /// Blank record in the type's initial status.
    fn draft(id: BsdId) -> Self;

    /// Whether fields may still be changed without a revision request.
    fn is_editable(&self) -> bool;

    fn is_refused(status: Self::Status) -> bool;
}

impl ManagedDocument for Form {
    const SPLIT_SIGNATURE_EVENTS: bool = true;

    fn draft(id: BsdId) -> Self {
        Form::new(id)
    }

    fn is_editable(&self) -> bool {
        matches!(self.status, BsddStatus::Draft | BsddStatus::Sealed)
    }

    fn is_refused(status: BsddStatus) -> bool {
        status == BsddStatus::Refused
    }
}

impl ManagedDocument for Bsda {
    const SPLIT_SIGNATURE_EVENTS: bool = true;

    fn draft(id: BsdId) -> Self {
        Bsda::new(id)
    }

    fn is_editable(&self) -> bool {
        self.status == BsdaStatus::Initial
    }

    fn is_refused(status: BsdaStatus) -> bool {
        status == BsdaStatus::Refused
    }
}

impl ManagedDocument for Bsdasri {
    const SPLIT_SIGNATURE_EVENTS: bool = false;

    fn draft(id: BsdId) -> Self {
        Bsdasri::new(id)
    }

    fn is_editable(&self) -> bool {
        self.status == BsdasriStatus::Initial
    }

    fn is_refused(status: BsdasriStatus) -> bool {
        status == BsdasriStatus::Refused
    }
}

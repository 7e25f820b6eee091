//! Independent verification of composed joints

use thiserror::Error;

use super::unit::{Joint, UnitError};
use crate::definition::{Address, SpendingDefinition};

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("No definition for author {0}")]
    MissingDefinition(String),
    #[error("Definition does not hash to author address {0}")]
    DefinitionMismatch(String),
    #[error("Authentifiers of {0} do not satisfy its definition")]
    Unsatisfied(String),
    #[error("Unit id does not match its content")]
    BadUnitId,
    #[error("Payload hash mismatch in message {0}")]
    PayloadHashMismatch(usize),
    #[error("Unit error: {0}")]
    Unit(#[from] UnitError),
}

/// Check unit id, payload hashes and every author's signatures.
///
/// `lookup` supplies definitions for authors that do not embed one.
pub fn verify_joint<F>(joint: &Joint, lookup: F) -> Result<(), VerifyError>
where
    F: Fn(&Address) -> Option<SpendingDefinition>,
{
    let unit = &joint.unit;

    for (i, message) in unit.messages.iter().enumerate() {
        if !message.payload_matches()? {
            return Err(VerifyError::PayloadHashMismatch(i));
        }
    }

    let digest = unit.hash_to_sign()?;
    for author in &unit.authors {
        let definition = match &author.definition {
            Some(d) => d.clone(),
            None => lookup(&author.address)
                .ok_or_else(|| VerifyError::MissingDefinition(author.address.to_string()))?,
        };
        let derived = definition
            .address()
            .map_err(|_| VerifyError::DefinitionMismatch(author.address.to_string()))?;
        if derived != author.address {
            return Err(VerifyError::DefinitionMismatch(author.address.to_string()));
        }
        if !definition.is_satisfied(&author.authentifiers, &digest) {
            return Err(VerifyError::Unsatisfied(author.address.to_string()));
        }
    }

    if unit.unit.as_deref() != Some(unit.compute_id()?.as_str()) {
        return Err(VerifyError::BadUnitId);
    }
    Ok(())
}

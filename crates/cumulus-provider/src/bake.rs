use crate::ProviderError;
use cumulus_schema::{ImageId, Role, Stack};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Stages a single image bake passes through.
///
/// Compute is acquired on `Provisioning` and must be given back on
/// `Released`, whether or not the bake succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BakePhase {
    Pending,
    Provisioning,
    Transferring,
    Configuring,
    Snapshotting,
    Released,
    Failed,
}

impl BakePhase {
    pub const ACTIVE: [BakePhase; 4] = [
        BakePhase::Provisioning,
        BakePhase::Transferring,
        BakePhase::Configuring,
        BakePhase::Snapshotting,
    ];

    pub fn is_active(self) -> bool {
        Self::ACTIVE.contains(&self)
    }
}

impl std::fmt::Display for BakePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Provisioning => "provisioning",
            Self::Transferring => "transferring",
            Self::Configuring => "configuring",
            Self::Snapshotting => "snapshotting",
            Self::Released => "released",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

pub fn validate_transition(from: BakePhase, to: BakePhase) -> Result<(), ProviderError> {
    use BakePhase::{Configuring, Failed, Pending, Provisioning, Released, Snapshotting, Transferring};

    let valid = matches!(
        (from, to),
        (Pending, Provisioning)
            | (Provisioning, Transferring)
            | (Transferring, Configuring)
            | (Configuring, Snapshotting)
            | (Snapshotting, Released)
            | (Provisioning | Transferring | Configuring | Snapshotting, Failed)
            | (Failed, Released)
    );

    if valid {
        Ok(())
    } else {
        Err(ProviderError::InvalidTransition { from, to })
    }
}

/// Tracks one role's walk through the bake phases.
#[derive(Debug, Clone)]
pub struct BakeSession {
    role: String,
    phase: BakePhase,
    history: Vec<BakePhase>,
}

impl BakeSession {
    pub fn new(role: &str) -> Self {
        Self {
            role: role.to_owned(),
            phase: BakePhase::Pending,
            history: vec![BakePhase::Pending],
        }
    }

    pub fn phase(&self) -> BakePhase {
        self.phase
    }

    pub fn history(&self) -> &[BakePhase] {
        &self.history
    }

    pub fn advance(&mut self, to: BakePhase) -> Result<(), ProviderError> {
        validate_transition(self.phase, to)?;
        self.phase = to;
        self.history.push(to);
        Ok(())
    }

    /// Drive every active phase through `step`, then release.
    ///
    /// `step` is also invoked for `Released`; that call runs on the failure
    /// path too, so acquired compute never outlives the session.
    pub fn run(
        &mut self,
        mut step: impl FnMut(BakePhase) -> Result<(), ProviderError>,
    ) -> Result<(), ProviderError> {
        for phase in BakePhase::ACTIVE {
            self.advance(phase)?;
            if let Err(e) = step(phase) {
                warn!("bake of role '{}' failed during {phase}: {e}", self.role);
                self.advance(BakePhase::Failed)?;
                self.advance(BakePhase::Released)?;
                step(BakePhase::Released)?;
                return Err(ProviderError::BakeFailed {
                    role: self.role.clone(),
                    phase,
                    reason: e.to_string(),
                });
            }
        }
        self.advance(BakePhase::Released)?;
        step(BakePhase::Released)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BakeRequest<'a> {
    pub stack: &'a str,
    pub role: &'a Role,
}

/// Produces a machine image for a role from its base image and provisioners.
pub trait ImageBaker: Send + Sync {
    fn name(&self) -> &str;

    fn available(&self) -> bool;

    fn bake(&self, request: &BakeRequest<'_>) -> Result<ImageId, ProviderError>;
}

pub fn select_baker(name: &str) -> Result<Box<dyn ImageBaker>, ProviderError> {
    match name {
        "mock" => Ok(Box::new(crate::mock::MockBaker::new())),
        other => Err(ProviderError::BakerUnavailable(other.to_owned())),
    }
}

/// Bake every role that has no image yet and record the result on the role.
///
/// Returns the image of every role, pinned ones included, keyed by role name.
pub fn bake_stack(
    stack: &mut Stack,
    baker: &dyn ImageBaker,
) -> Result<BTreeMap<String, ImageId>, ProviderError> {
    if !baker.available() {
        return Err(ProviderError::BakerUnavailable(baker.name().to_owned()));
    }

    let stack_name = stack.name.clone();
    let mut images = BTreeMap::new();
    for role in &mut stack.roles {
        let image = if let Some(pinned) = &role.image {
            info!("role '{}' pinned to {pinned}, skipping bake", role.name);
            pinned.clone()
        } else {
            info!("baking image for role '{}' with {}", role.name, baker.name());
            let image = baker.bake(&BakeRequest {
                stack: &stack_name,
                role: &*role,
            })?;
            role.set_image(image.clone());
            image
        };
        images.insert(role.name.clone(), image);
    }
    Ok(images)
}

use crate::identity::provisioning_digest;
use crate::model::Stack;
use crate::types::ImageId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const LOCK_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("images lock I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("images lock parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("images lock serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("unsupported images lock version {0}, expected 1")]
    UnsupportedVersion(u32),
    #[error("images lock digest mismatch: lock has '{lock_digest}', recomputed '{computed}'")]
    DigestMismatch {
        lock_digest: String,
        computed: String,
    },
    #[error("images lock drift: {0}")]
    ImageDrift(String),
}

/// One baked image and the provisioning inputs it was baked from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockedImage {
    pub image: ImageId,
    #[serde(default)]
    pub base_image: Option<String>,
    pub provisioning_digest: String,
}

/// Record of the bake pipeline's output for every role of a stack.
///
/// `compile` consumes this instead of re-baking: applying the lock fills in
/// `Role.image` for each role, after checking that nothing that feeds the
/// bake has changed since.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageLock {
    pub lock_version: u32,
    pub stack: String,
    pub digest: String,
    pub images: BTreeMap<String, LockedImage>,
}

impl ImageLock {
    /// Build a lock from bake results; roles missing from `images` are skipped.
    pub fn from_images(stack: &Stack, images: &BTreeMap<String, ImageId>) -> Self {
        let entries = stack
            .roles
            .iter()
            .filter_map(|role| {
                images.get(&role.name).map(|image| {
                    (
                        role.name.clone(),
                        LockedImage {
                            image: image.clone(),
                            base_image: role.base_image.clone(),
                            provisioning_digest: provisioning_digest(role),
                        },
                    )
                })
            })
            .collect();

        let lock = ImageLock {
            lock_version: LOCK_VERSION,
            stack: stack.name.clone(),
            digest: String::new(), // computed below
            images: entries,
        };
        ImageLock {
            digest: lock.compute_digest(),
            ..lock
        }
    }

    pub fn compute_digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(format!("stack:{}", self.stack).as_bytes());
        // BTreeMap iteration keeps this ordered by role name.
        for (role, entry) in &self.images {
            hasher.update(
                format!(
                    "image:{role}:{}:{}:{}",
                    entry.image,
                    entry.base_image.as_deref().unwrap_or(""),
                    entry.provisioning_digest
                )
                .as_bytes(),
            );
        }
        hasher.finalize().to_hex().to_string()
    }

    pub fn verify_integrity(&self) -> Result<(), LockError> {
        if self.lock_version != LOCK_VERSION {
            return Err(LockError::UnsupportedVersion(self.lock_version));
        }
        let computed = self.compute_digest();
        if self.digest != computed {
            return Err(LockError::DigestMismatch {
                lock_digest: self.digest.clone(),
                computed,
            });
        }
        Ok(())
    }

    /// Check that every unpinned role has an image baked from its current inputs.
    pub fn verify_stack_intent(&self, stack: &Stack) -> Result<(), LockError> {
        if self.stack != stack.name {
            return Err(LockError::ImageDrift(format!(
                "lock is for stack '{}', stackfile declares '{}'",
                self.stack, stack.name
            )));
        }
        for role in &stack.roles {
            if role.image.is_some() {
                continue;
            }
            let Some(entry) = self.images.get(&role.name) else {
                return Err(LockError::ImageDrift(format!(
                    "role '{}' has no baked image. Run 'cumulus bake' first.",
                    role.name
                )));
            };
            if entry.provisioning_digest != provisioning_digest(role) {
                return Err(LockError::ImageDrift(format!(
                    "provisioning for role '{}' changed since it was baked. Run 'cumulus bake' to rebuild.",
                    role.name
                )));
            }
        }
        Ok(())
    }

    /// Set `Role.image` on every role that has no pinned image. Returns how
    /// many roles were updated.
    pub fn apply(&self, stack: &mut Stack) -> Result<usize, LockError> {
        self.verify_integrity()?;
        self.verify_stack_intent(stack)?;
        let mut applied = 0;
        for role in &mut stack.roles {
            if role.image.is_some() {
                continue;
            }
            if let Some(entry) = self.images.get(&role.name) {
                role.set_image(entry.image.clone());
                applied += 1;
            }
        }
        Ok(applied)
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), LockError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::io::Write::write_all(&mut tmp, content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| LockError::Io(e.error))?;
        Ok(())
    }

    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self, LockError> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::parse_stack_str;

    fn sample_stack() -> Stack {
        parse_stack_str(
            r#"
name = "logs"

[[role]]
name = "logstash"
network = "vpc-0abc"
base_image = "ami-base"
provisioners = [{ type = "chef", run_list = "logstash" }]

[[role]]
name = "utility"
network = "vpc-0abc"
"#,
        )
        .unwrap()
        .normalize()
        .unwrap()
    }

    fn sample_images() -> BTreeMap<String, ImageId> {
        let mut images = BTreeMap::new();
        images.insert("logstash".to_owned(), ImageId::new("ami-1111"));
        images.insert("utility".to_owned(), ImageId::new("ami-2222"));
        images
    }

    #[test]
    fn lock_roundtrip() {
        let lock = ImageLock::from_images(&sample_stack(), &sample_images());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("images.lock");

        lock.write_to_file(&path).unwrap();
        let loaded = ImageLock::read_from_file(&path).unwrap();
        assert_eq!(lock, loaded);
    }

    #[test]
    fn integrity_check_passes() {
        let lock = ImageLock::from_images(&sample_stack(), &sample_images());
        assert!(lock.verify_integrity().is_ok());
    }

    #[test]
    fn integrity_fails_on_tamper() {
        let mut lock = ImageLock::from_images(&sample_stack(), &sample_images());
        lock.images.get_mut("utility").unwrap().image = ImageId::new("ami-evil");
        assert!(matches!(
            lock.verify_integrity(),
            Err(LockError::DigestMismatch { .. })
        ));
    }

    #[test]
    fn apply_sets_images() {
        let mut stack = sample_stack();
        let lock = ImageLock::from_images(&stack, &sample_images());
        assert_eq!(lock.apply(&mut stack).unwrap(), 2);
        assert_eq!(
            stack.role("logstash").unwrap().image.as_deref(),
            Some("ami-1111")
        );
        assert!(stack.unbaked_roles().is_empty());
    }

    #[test]
    fn provisioning_change_is_drift() {
        let stack = sample_stack();
        let lock = ImageLock::from_images(&stack, &sample_images());

        let mut changed = stack.clone();
        changed.role_mut("logstash").unwrap().base_image = Some("ami-newer".to_owned());
        assert!(matches!(
            lock.verify_stack_intent(&changed),
            Err(LockError::ImageDrift(_))
        ));
    }

    #[test]
    fn missing_role_is_drift() {
        let stack = sample_stack();
        let mut images = sample_images();
        images.remove("utility");
        let lock = ImageLock::from_images(&stack, &images);
        let err = lock.verify_stack_intent(&stack).unwrap_err();
        assert!(err.to_string().contains("utility"));
    }

    #[test]
    fn pinned_roles_need_no_lock_entry() {
        let mut stack = sample_stack();
        stack.role_mut("utility").unwrap().image = Some(ImageId::new("ami-pinned"));
        let mut images = sample_images();
        images.remove("utility");
        let lock = ImageLock::from_images(&stack, &images);
        assert_eq!(lock.apply(&mut stack).unwrap(), 1);
        assert_eq!(
            stack.role("utility").unwrap().image.as_deref(),
            Some("ami-pinned")
        );
    }

    #[test]
    fn same_images_same_digest() {
        let a = ImageLock::from_images(&sample_stack(), &sample_images());
        let b = ImageLock::from_images(&sample_stack(), &sample_images());
        assert_eq!(a.digest, b.digest);
    }
}

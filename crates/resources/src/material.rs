//! Material identities.
//!
//! A material is fully described by its three texture paths. Two draws whose
//! paths match share one identity and therefore one descriptor set per pass.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// Deterministic key over `(albedo, normal, metallic_roughness)` paths.
///
/// The key renders as `albedo|normal|metallic_roughness`, with an empty
/// component for a missing path. Equality and hashing use the key only.
#[derive(Clone, Debug)]
pub struct MaterialIdentity {
    key: String,
    albedo: Option<PathBuf>,
    normal: Option<PathBuf>,
    metallic_roughness: Option<PathBuf>,
}

impl MaterialIdentity {
    pub fn new(
        albedo: Option<PathBuf>,
        normal: Option<PathBuf>,
        metallic_roughness: Option<PathBuf>,
    ) -> Self {
        let component = |path: &Option<PathBuf>| {
            path.as_deref()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        let key = format!(
            "{}|{}|{}",
            component(&albedo),
            component(&normal),
            component(&metallic_roughness)
        );

        Self {
            key,
            albedo,
            normal,
            metallic_roughness,
        }
    }

    /// A material that uses the default texture in every slot.
    pub fn untextured() -> Self {
        Self::new(None, None, None)
    }

    /// Albedo-only material.
    pub fn albedo(path: impl Into<PathBuf>) -> Self {
        Self::new(Some(path.into()), None, None)
    }

    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn albedo_path(&self) -> Option<&Path> {
        self.albedo.as_deref()
    }

    pub fn normal_path(&self) -> Option<&Path> {
        self.normal.as_deref()
    }

    pub fn metallic_roughness_path(&self) -> Option<&Path> {
        self.metallic_roughness.as_deref()
    }
}

impl Default for MaterialIdentity {
    fn default() -> Self {
        Self::untextured()
    }
}

impl PartialEq for MaterialIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for MaterialIdentity {}

impl Hash for MaterialIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for MaterialIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_key_format() {
        let id = MaterialIdentity::new(
            Some("textures/brick.png".into()),
            None,
            Some("textures/brick_mr.png".into()),
        );
        assert_eq!(id.key(), "textures/brick.png||textures/brick_mr.png");
        assert_eq!(id.to_string(), id.key());
        assert_eq!(MaterialIdentity::untextured().key(), "||");
    }

    #[test]
    fn test_identical_paths_share_identity() {
        let a = MaterialIdentity::albedo("a.png");
        let b = MaterialIdentity::new(Some(PathBuf::from("a.png")), None, None);
        assert_eq!(a, b);

        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_slot_order_matters() {
        let albedo = MaterialIdentity::new(Some("x.png".into()), None, None);
        let normal = MaterialIdentity::new(None, Some("x.png".into()), None);
        assert_ne!(albedo, normal);
    }
}

use crate::model::{Provisioner, Role};

/// Digest of everything that determines what the bake pipeline produces for a
/// role: its base image, instance type and provisioners in declaration order.
///
/// The images lock stores this digest so that a changed provisioner list is
/// detected as drift instead of silently reusing a stale image.
pub fn provisioning_digest(role: &Role) -> String {
    let mut hasher = blake3::Hasher::new();

    hasher.update(format!("base:{}", role.base_image.as_deref().unwrap_or("")).as_bytes());
    hasher.update(format!("type:{}", role.instance_type).as_bytes());

    for provisioner in &role.provisioners {
        match provisioner {
            Provisioner::File {
                source,
                destination,
            } => hasher.update(format!("file:{source}:{destination}").as_bytes()),
            Provisioner::Chef { run_list } => {
                hasher.update(format!("chef:{}", run_list.join(",")).as_bytes())
            }
            Provisioner::Shell { inline } => {
                hasher.update(format!("shell:{}", inline.join("\n")).as_bytes())
            }
            Provisioner::Ansible {
                playbook,
                extra_vars,
            } => {
                let vars: Vec<String> = extra_vars.iter().map(|(k, v)| format!("{k}={v}")).collect();
                hasher.update(format!("ansible:{playbook}:{}", vars.join(",")).as_bytes())
            }
        };
    }

    hasher.finalize().to_hex().to_string()
}

//! Role profiles: reusable partial roles merged into the roles that include them.
//!
//! Scalars set by a profile override the role's own value, collections are
//! appended (without duplicates) and maps are overlaid. Profiles are applied in
//! the order the role lists them, so a later profile wins over an earlier one.

use crate::manifest::{PartialRole, RoleProfile};

impl PartialRole {
    pub fn apply_profile(&mut self, profile: &RoleProfile) {
        override_with(&mut self.min_size, &profile.min_size);
        override_with(&mut self.max_size, &profile.max_size);
        override_with(&mut self.target_size, &profile.target_size);
        override_with(&mut self.update_policy, &profile.update_policy);
        override_with(&mut self.instance_type, &profile.instance_type);
        override_with(&mut self.key_pair, &profile.key_pair);
        override_with(&mut self.network, &profile.network);
        override_with(&mut self.base_image, &profile.base_image);
        override_with(&mut self.image, &profile.image);

        append_unique(&mut self.block_devices, &profile.block_devices);
        append_unique(&mut self.subnets, &profile.subnets);
        append_unique(&mut self.security_groups, &profile.security_groups);
        append_unique(&mut self.policy_statements, &profile.policy_statements);
        append_unique(&mut self.allow, &profile.allow);
        append_unique(&mut self.provisioners, &profile.provisioners);
        append_unique(&mut self.load_balancers, &profile.load_balancers);

        for (k, v) in &profile.vars {
            self.vars.insert(k.clone(), v.clone());
        }
        for (k, v) in &profile.tags {
            self.tags.insert(k.clone(), v.clone());
        }
    }
}

fn override_with<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        target.clone_from(value);
    }
}

fn append_unique<T: Clone + PartialEq>(target: &mut Vec<T>, values: &[T]) {
    for v in values {
        if !target.contains(v) {
            target.push(v.clone());
        }
    }
}

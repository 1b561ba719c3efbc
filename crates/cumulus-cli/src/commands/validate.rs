use super::{json_pretty, stack_error, EXIT_SUCCESS};
use std::path::Path;

pub fn run(stackfile: &Path, json: bool) -> Result<u8, String> {
    let stack = cumulus_schema::load_stack(stackfile).map_err(|e| stack_error(&e))?;
    let load_balancers = stack.load_balancers().count();
    let unbaked = stack.unbaked_roles();

    if json {
        let payload = serde_json::json!({
            "stack": stack.name,
            "valid": true,
            "networks": stack.networks.len(),
            "roles": stack.roles.len(),
            "load_balancers": load_balancers,
            "caches": stack.caches.len(),
            "buckets": stack.buckets.len(),
            "unbaked_roles": unbaked,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("stack '{}' is valid", stack.name);
        println!("  networks:       {}", stack.networks.len());
        println!("  roles:          {}", stack.roles.len());
        println!("  load balancers: {load_balancers}");
        println!("  caches:         {}", stack.caches.len());
        println!("  buckets:        {}", stack.buckets.len());
        if !unbaked.is_empty() {
            println!("  unbaked roles:  {}", unbaked.join(", "));
        }
    }
    Ok(EXIT_SUCCESS)
}

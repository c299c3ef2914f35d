use projbot_agent::operations::default_registry;

/// Renders the operation catalog, one block per operation with its
/// parameters and whether each is required.
pub fn run() -> String {
    let registry = default_registry();
    let mut lines = vec![format!("{} registered operations:", registry.len())];

    for spec in registry.catalog() {
        lines.push(String::new());
        lines.push(format!("{} - {}", spec.name, spec.description));
        for (name, param) in &spec.params {
            let requirement = if param.required { "required" } else { "optional" };
            lines.push(format!("  {name} ({requirement}): {}", param.description));
        }
    }

    lines.join("\n")
}

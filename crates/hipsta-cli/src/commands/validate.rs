use std::path::Path;

use hipsta_config::LibraryConfig;

pub fn run(config: &LibraryConfig, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => println!("Checking {}", p.display()),
        None => println!("Checking built-in defaults"),
    }

    let errors = config.effective().validate();
    if errors.is_empty() {
        println!("Configuration is valid");
        return Ok(());
    }

    for e in &errors {
        println!("  error: {}", e);
    }
    Err(format!("{} configuration error(s)", errors.len()).into())
}

use hipsta_config::LibraryConfig;

pub fn run(config: &LibraryConfig) -> Result<(), Box<dyn std::error::Error>> {
    let yaml = serde_yaml::to_string(&config.effective())?;
    println!("{}", yaml);
    Ok(())
}

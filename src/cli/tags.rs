use anyhow::Result;

use crate::config::Config;

pub fn run(config: &Config) -> Result<()> {
    let taxonomy = config.taxonomy()?;
    if taxonomy.is_empty() {
        println!("No tags configured.");
        return Ok(());
    }

    println!("{:<30} {}", "Path", "Tag");
    println!("{}", "-".repeat(50));
    for (path, tag) in taxonomy.entries() {
        println!("{:<30} {}", path, tag.trim_end());
    }
    Ok(())
}

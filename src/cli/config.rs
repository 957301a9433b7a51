use crate::hell_yaml::HellYaml;
use crate::{Result, env};
use console::style;

/// Validate and print the resolved daemon configuration
#[derive(Debug, clap::Args)]
pub struct Config {}

impl Config {
    pub async fn run(&self) -> Result<()> {
        let doc = HellYaml::read(&*env::HELL_CONFIG_PATH)?;
        println!("daemons root: {}", doc.daemons_root().display());
        for config in doc.resolve() {
            println!();
            println!("{}", style(&config.name).bold());
            println!("  target: {}", config.main_file.display());
            if !config.main_file_arguments.is_empty() {
                println!(
                    "  arguments: {}",
                    shell_words::join(&config.main_file_arguments)
                );
            }
            if let Some(requirements) = &config.requirements_path {
                println!("  requirements: {}", requirements.display());
            }
            if let Some(source) = &config.source_url {
                println!("  source: {source}");
            }
            println!("  auto-restart: {}", config.keep_running);
            println!("  virtualenv: {}", config.create_env);
        }
        Ok(())
    }
}

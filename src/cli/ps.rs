use crate::hell_yaml::HellYaml;
use crate::procs::PROCS;
use crate::{Result, env};

/// Scan the OS process table for daemon processes under the configured root
#[derive(Debug, clap::Args)]
pub struct Ps {}

impl Ps {
    pub async fn run(&self) -> Result<()> {
        let doc = HellYaml::read(&*env::HELL_CONFIG_PATH)?;
        let root = doc.daemons_root();
        let owned = PROCS.find_owned(&root);
        if owned.is_empty() {
            println!("no daemon processes found under {}", root.display());
            return Ok(());
        }
        for (pid, script) in owned {
            println!("{pid}\t{}", script.display());
        }
        Ok(())
    }
}

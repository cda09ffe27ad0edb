//! `forwagent init`

use std::path::Path;

use anyhow::Result;

use crate::output::{format_setup, print_error, print_info, print_success, print_warning};

/// Create the configuration directory and key material
pub fn init_command(config_dir: &Path) -> Result<()> {
    let result = match fa_core::init(config_dir) {
        Ok(result) => result,
        Err(e) => {
            print_error(&format!("Setup failed: {:#}", e));
            return Err(e);
        }
    };

    println!("{}", format_setup(&result));

    if result.generated_identity {
        print_success("Generated a new key and certificate");
    } else {
        print_info("Existing key material left untouched");
    }

    if result.created_trust_bundle {
        print_warning(&format!(
            "{} is empty: append the peer's cert.pem to it before connecting",
            result.paths.trusted.display()
        ));
    }
    Ok(())
}

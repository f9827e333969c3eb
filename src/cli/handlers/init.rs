use std::path::Path;

use crate::io::project_io::{self, CANOPY_DIR};

pub fn cmd_init(root: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    // Check for parent project and warn
    if let Some(parent) = root.parent()
        && let Ok(outer) = project_io::discover_project(parent)
    {
        eprintln!("Note: parent project found at {}/", outer.dir.display());
        eprintln!("Creating new project in ./{}/", CANOPY_DIR);
    }

    let paths = project_io::init_project(root)?;
    if json {
        println!("{}", serde_json::json!({ "initialized": paths.dir }));
    } else {
        println!("initialized {}", paths.dir.display());
    }
    Ok(())
}

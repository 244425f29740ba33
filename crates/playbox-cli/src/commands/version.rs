use miette::Result;
use playbox_core::version::{version_string, VERSION};

pub fn run(json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::json!({ "name": "playbox", "version": VERSION }));
    } else {
        println!("{}", version_string());
    }
    Ok(())
}

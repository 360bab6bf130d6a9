use std::path::Path;

pub fn is_config_file(v: String) -> Result<(), String> {
    let path = Path::new(&v);

    if !path.is_file() {
        return Err(format!("`{}` is not a file", v));
    }

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => Ok(()),
        _ => Err("must be a .yaml or .yml file".to_owned()),
    }
}

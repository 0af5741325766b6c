use astroget::utils::validation::validate_url;

fn manifest() -> toml::Table {
    let content = std::fs::read_to_string(concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml"))
        .unwrap();
    toml::from_str(&content).unwrap()
}

#[test]
fn test_package_metadata_is_complete() {
    let manifest = manifest();
    let package = manifest["package"].as_table().unwrap();

    assert_eq!(package["name"].as_str(), Some("astroget"));
    assert!(!package["version"].as_str().unwrap().is_empty());
    assert!(!package["description"].as_str().unwrap().is_empty());
    assert!(!package["license"].as_str().unwrap().is_empty());
    assert!(!package["authors"].as_array().unwrap().is_empty());
}

#[test]
fn test_package_urls_are_valid() {
    let manifest = manifest();
    let package = manifest["package"].as_table().unwrap();

    for key in ["homepage", "repository", "documentation"] {
        let url = package[key].as_str().unwrap();
        assert!(validate_url(key, url).is_ok(), "{} = {}", key, url);
    }
}

#[test]
fn test_binary_needs_cli_feature() {
    let manifest = manifest();
    let bin = &manifest["bin"].as_array().unwrap()[0];
    assert_eq!(bin["name"].as_str(), Some("astroget"));
    let required = bin["required-features"].as_array().unwrap();
    assert!(required.iter().any(|f| f.as_str() == Some("cli")));
}

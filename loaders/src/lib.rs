pub mod mtx;

#[cfg(test)]
fn get_data_dir() -> String {
    format!("{}/data", env!("CARGO_MANIFEST_DIR"))
}

//! `stage` command: upload local CSV files into the object store.

use std::{fs, path::PathBuf};

use anyhow::{Context, Result, anyhow};
use log::info;

use crate::{
    cli::StageArgs,
    config::IngestConfig,
    store::{CSV_CONTENT_TYPE, FsObjectStore, ObjectStore},
};

pub fn execute(args: &StageArgs) -> Result<()> {
    let config = IngestConfig::from_store_args(&args.store)?;
    let store = FsObjectStore::open(&config.store_root, &config.bucket)?;
    stage_files(&store, &config.prefix, &args.inputs)
}

pub fn stage_files(
    store: &dyn ObjectStore,
    prefix: &str,
    inputs: &[PathBuf],
) -> Result<()> {
    for input in inputs {
        let name = input
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("Input {input:?} has no usable file name"))?;
        let bytes = fs::read(input).with_context(|| format!("Reading {input:?}"))?;
        let key = format!("{prefix}{name}");
        store
            .put(&key, &bytes, CSV_CONTENT_TYPE)
            .with_context(|| format!("Uploading {input:?} to '{key}'"))?;
        info!("✓ Uploaded {input:?} as '{key}'");
    }
    info!("Staged {} file(s) under '{prefix}'", inputs.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryObjectStore;
    use tempfile::tempdir;

    #[test]
    fn stage_files_keys_by_prefix_and_file_name() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("votacao_candidato_munzona_2022_SP.csv");
        fs::write(&path, "SG_UF;QT_VOTOS\nSP;1\n").expect("write input");

        let store = MemoryObjectStore::new();
        stage_files(&store, "eleicoes_2022/", &[path]).expect("stage");

        let object = store
            .object("eleicoes_2022/votacao_candidato_munzona_2022_SP.csv")
            .expect("object stored");
        assert_eq!(object.content_type, CSV_CONTENT_TYPE);
        assert_eq!(object.bytes, b"SG_UF;QT_VOTOS\nSP;1\n");
    }
}

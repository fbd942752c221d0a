//! Reads contract bundles from a Hardhat artifacts directory.
//!
//! Layout: `<root>/<source path>/<Contract>.json`, for example
//! `dist/artifacts/contracts/Controller.sol/Controller.json`. Compiler inputs live
//! under `<root>/build-info` and debug sidecars are named `<Contract>.dbg.json`;
//! neither is ever returned as a contract.

use super::{ArtifactStore, ContractBundle};
use crate::error::ResolveError;
use async_trait::async_trait;
use ethers::abi::Abi;
use ethers::types::Bytes;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};

const BUILD_INFO_DIR: &str = "build-info";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HardhatArtifact {
    contract_name: String,
    source_name: String,
    abi: Abi,
    bytecode: String,
    /// source file -> library name -> placeholder offsets
    #[serde(default)]
    link_references: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
}

/// [`ArtifactStore`] over a Hardhat artifacts directory.
#[derive(Clone, Debug)]
pub struct HardhatArtifacts {
    root: PathBuf,
}

impl HardhatArtifacts {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ArtifactStore for HardhatArtifacts {
    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn contract_bundle(&self, name: &str) -> Result<ContractBundle, ResolveError> {
        let root = self.root.clone();
        let lookup = name.to_owned();
        let path = tokio::task::spawn_blocking(move || locate(&root, &lookup))
            .await
            .map_err(|e| ResolveError::Malformed {
                path: self.root.display().to_string(),
                reason: e.to_string(),
            })??;
        debug!(path = %path.display(), "Artifact located");

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ResolveError::Malformed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        parse_artifact(&path, &content)
    }
}

fn locate(root: &Path, name: &str) -> Result<PathBuf, ResolveError> {
    if let Some((source, contract)) = name.rsplit_once(':') {
        let path = root.join(source).join(format!("{contract}.json"));
        return if path.is_file() {
            Ok(path)
        } else {
            Err(ResolveError::NotFound(name.to_owned()))
        };
    }

    let file_name = format!("{name}.json");
    let mut matches = Vec::new();
    if let Err(e) = collect_matches(root, &file_name, true, &mut matches) {
        return Err(match e.kind() {
            io::ErrorKind::NotFound => ResolveError::NotFound(name.to_owned()),
            _ => ResolveError::Malformed {
                path: root.display().to_string(),
                reason: e.to_string(),
            },
        });
    }
    matches.sort();

    match matches.len() {
        0 => Err(ResolveError::NotFound(name.to_owned())),
        1 => Ok(matches.remove(0)),
        _ => {
            let candidates: Vec<String> = matches
                .iter()
                .map(|path| fully_qualified_name(root, path, name))
                .collect();
            warn!(name, ?candidates, "Ambiguous contract name");
            Err(ResolveError::Ambiguous {
                name: name.to_owned(),
                candidates,
            })
        }
    }
}

fn collect_matches(
    dir: &Path,
    file_name: &str,
    is_root: bool,
    out: &mut Vec<PathBuf>,
) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if is_root && entry.file_name() == BUILD_INFO_DIR {
                continue;
            }
            collect_matches(&entry.path(), file_name, false, out)?;
        } else if file_type.is_file() && entry.file_name() == file_name {
            out.push(entry.path());
        }
    }
    Ok(())
}

fn fully_qualified_name(root: &Path, artifact: &Path, name: &str) -> String {
    let source = artifact
        .parent()
        .and_then(|p| p.strip_prefix(root).ok())
        .map(|p| {
            p.components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default();
    format!("{source}:{name}")
}

fn parse_artifact(path: &Path, content: &str) -> Result<ContractBundle, ResolveError> {
    let malformed = |reason: String| ResolveError::Malformed {
        path: path.display().to_string(),
        reason,
    };

    let artifact: HardhatArtifact =
        serde_json::from_str(content).map_err(|e| malformed(e.to_string()))?;

    if !artifact.link_references.is_empty() {
        let libraries = artifact
            .link_references
            .iter()
            .flat_map(|(source, libs)| libs.keys().map(move |lib| format!("{source}:{lib}")))
            .collect();
        return Err(ResolveError::UnlinkedLibraries {
            name: artifact.contract_name,
            libraries,
        });
    }

    let code = artifact.bytecode.trim();
    if code.is_empty() || code == "0x" {
        return Err(ResolveError::NotDeployable(artifact.contract_name));
    }
    let bytecode: Bytes = code.parse().map_err(|e| malformed(format!("bytecode: {e}")))?;

    Ok(ContractBundle {
        name: artifact.contract_name,
        source_name: artifact.source_name,
        abi: artifact.abi,
        bytecode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const ABI: &str = r#"[
        {"type":"function","name":"initialize","inputs":[],"outputs":[],"stateMutability":"nonpayable"}
    ]"#;

    fn write_artifact(root: &Path, source: &str, name: &str, bytecode: &str, links: &str) {
        let dir = root.join(source);
        fs::create_dir_all(&dir).unwrap();
        let json = format!(
            r#"{{"_format":"hh-sol-artifact-1","contractName":"{name}","sourceName":"{source}","abi":{ABI},"bytecode":"{bytecode}","deployedBytecode":"0x","linkReferences":{links},"deployedLinkReferences":{{}}}}"#
        );
        fs::write(dir.join(format!("{name}.json")), json).unwrap();
        fs::write(dir.join(format!("{name}.dbg.json")), r#"{"buildInfo":"../../build-info/x.json"}"#).unwrap();
    }

    #[tokio::test]
    async fn test_resolves_bare_name() {
        let tmp = TempDir::new().unwrap();
        write_artifact(tmp.path(), "contracts/Controller.sol", "Controller", "0x6080", "{}");
        fs::create_dir_all(tmp.path().join("build-info")).unwrap();
        fs::write(tmp.path().join("build-info/Controller.json"), "{}").unwrap();

        let store = HardhatArtifacts::new(tmp.path());
        let bundle = store.contract_bundle("Controller").await.unwrap();

        assert_eq!(bundle.name, "Controller");
        assert_eq!(bundle.fully_qualified_name(), "contracts/Controller.sol:Controller");
        assert_eq!(bundle.bytecode.to_vec(), vec![0x60, 0x80]);
        assert!(bundle.abi.function("initialize").is_ok());
    }

    #[tokio::test]
    async fn test_resolves_fully_qualified_name() {
        let tmp = TempDir::new().unwrap();
        write_artifact(tmp.path(), "contracts/a/Controller.sol", "Controller", "0x01", "{}");
        write_artifact(tmp.path(), "contracts/b/Controller.sol", "Controller", "0x02", "{}");

        let store = HardhatArtifacts::new(tmp.path());
        let bundle = store
            .contract_bundle("contracts/b/Controller.sol:Controller")
            .await
            .unwrap();
        assert_eq!(bundle.bytecode.to_vec(), vec![0x02]);
    }

    #[tokio::test]
    async fn test_ambiguous_name_lists_candidates() {
        let tmp = TempDir::new().unwrap();
        write_artifact(tmp.path(), "contracts/a/Controller.sol", "Controller", "0x01", "{}");
        write_artifact(tmp.path(), "contracts/b/Controller.sol", "Controller", "0x02", "{}");

        let store = HardhatArtifacts::new(tmp.path());
        let err = store.contract_bundle("Controller").await.unwrap_err();
        assert_eq!(
            err,
            ResolveError::Ambiguous {
                name: "Controller".into(),
                candidates: vec![
                    "contracts/a/Controller.sol:Controller".into(),
                    "contracts/b/Controller.sol:Controller".into(),
                ],
            }
        );
    }

    #[tokio::test]
    async fn test_missing_contract_and_missing_directory() {
        let tmp = TempDir::new().unwrap();
        write_artifact(tmp.path(), "contracts/Other.sol", "Other", "0x01", "{}");

        let store = HardhatArtifacts::new(tmp.path());
        assert_eq!(
            store.contract_bundle("Controller").await.unwrap_err(),
            ResolveError::NotFound("Controller".into())
        );

        let store = HardhatArtifacts::new(tmp.path().join("does-not-exist"));
        assert_eq!(
            store.contract_bundle("Controller").await.unwrap_err(),
            ResolveError::NotFound("Controller".into())
        );
    }

    #[tokio::test]
    async fn test_abstract_contract_is_not_deployable() {
        let tmp = TempDir::new().unwrap();
        write_artifact(tmp.path(), "contracts/IController.sol", "IController", "0x", "{}");

        let store = HardhatArtifacts::new(tmp.path());
        assert_eq!(
            store.contract_bundle("IController").await.unwrap_err(),
            ResolveError::NotDeployable("IController".into())
        );
    }

    #[tokio::test]
    async fn test_unlinked_libraries_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let links = r#"{"contracts/Math.sol":{"Math":[{"length":20,"start":42}]}}"#;
        write_artifact(
            tmp.path(),
            "contracts/Controller.sol",
            "Controller",
            "0x6080__$abcdef$__",
            links,
        );

        let store = HardhatArtifacts::new(tmp.path());
        assert_eq!(
            store.contract_bundle("Controller").await.unwrap_err(),
            ResolveError::UnlinkedLibraries {
                name: "Controller".into(),
                libraries: vec!["contracts/Math.sol:Math".into()],
            }
        );
    }

    #[tokio::test]
    async fn test_malformed_artifact() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("contracts/Controller.sol");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("Controller.json"), "not json").unwrap();

        let store = HardhatArtifacts::new(tmp.path());
        let err = store.contract_bundle("Controller").await.unwrap_err();
        assert!(matches!(err, ResolveError::Malformed { .. }));
    }
}

use std::{collections::HashSet, fs::File, io::Read, path::Path};

use ethers::types::H160;
use serde::Deserialize;

use crate::transformer::ExtractionError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractKind {
    Flap,
    Flip,
    Flop,
    Vat,
    Jug,
    Cat,
}

/// A deployed contract instance to transform.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ContractConfig {
    pub name: String,
    pub kind: ContractKind,
    pub address: H160,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ContractsConfig {
    pub contracts: Vec<ContractConfig>,
}

impl ContractsConfig {
    pub fn from_yaml(contents: &str) -> Result<Self, ExtractionError> {
        let config: ContractsConfig = serde_yaml::from_str(contents)
            .map_err(|e| ExtractionError::Setup(format!("Invalid contracts config: {}", e)))?;
        let mut seen = HashSet::new();
        if let Some(dup) = config
            .contracts
            .iter()
            .find(|c| !seen.insert(c.address))
        {
            return Err(ExtractionError::Setup(format!(
                "Contract {} configured twice ({})",
                dup.address, dup.name
            )));
        }
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ExtractionError> {
        let mut contents = String::new();
        File::open(path.as_ref())
            .and_then(|mut file| file.read_to_string(&mut contents))
            .map_err(|e| {
                ExtractionError::Setup(format!(
                    "Failed to read {}: {}",
                    path.as_ref().display(),
                    e
                ))
            })?;
        Self::from_yaml(&contents)
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;

    const CONFIG: &str = r#"
contracts:
  - name: flap
    kind: flap
    address: "0x4d95a049d5b0b7d32058cd3f2163015747522e99"
  - name: vat
    kind: vat
    address: "0x35d1b3f3d7966a1dfe207aa4514c12a259a0492b"
"#;

    #[test]
    fn test_parse_contracts() {
        let res = ContractsConfig::from_yaml(CONFIG).unwrap();

        assert_eq!(
            res.contracts,
            vec![
                ContractConfig {
                    name: "flap".to_string(),
                    kind: ContractKind::Flap,
                    address: H160::from_str("0x4d95a049d5b0b7d32058cd3f2163015747522e99").unwrap(),
                },
                ContractConfig {
                    name: "vat".to_string(),
                    kind: ContractKind::Vat,
                    address: H160::from_str("0x35d1b3f3d7966a1dfe207aa4514c12a259a0492b").unwrap(),
                },
            ]
        );
    }

    #[test]
    fn test_unknown_kind() {
        let res = ContractsConfig::from_yaml(
            "contracts:\n  - name: pot\n    kind: pot\n    address: \"0x0000000000000000000000000000000000000001\"\n",
        );

        assert!(matches!(res, Err(ExtractionError::Setup(_))));
    }

    #[test]
    fn test_duplicate_address() {
        let res = ContractsConfig::from_yaml(
            "contracts:\n  - name: a\n    kind: flap\n    address: \"0x0000000000000000000000000000000000000001\"\n  - name: b\n    kind: flop\n    address: \"0x0000000000000000000000000000000000000001\"\n",
        );

        assert!(matches!(res, Err(ExtractionError::Setup(_))));
    }
}

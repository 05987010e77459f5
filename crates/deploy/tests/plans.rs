//! The plan files shipped in `plans/` must load and resolve.

use std::path::PathBuf;

use chainplan_deploy::{ArgRef, DeployMode, DeploymentPlan, resolve};

fn plans_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../plans")
}

fn load(name: &str) -> DeploymentPlan {
    DeploymentPlan::load_from_file(&plans_dir().join(name))
        .unwrap_or_else(|e| panic!("{name} should load: {e:#}"))
}

fn order(plan: &DeploymentPlan) -> Vec<String> {
    resolve(plan)
        .unwrap()
        .into_iter()
        .map(|spec| spec.name.clone())
        .collect()
}

#[test]
fn test_every_shipped_plan_resolves() {
    let mut count = 0;
    for entry in std::fs::read_dir(plans_dir()).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().is_some_and(|ext| ext == "toml") {
            let plan = DeploymentPlan::load_from_file(&path).unwrap();
            assert!(resolve(&plan).is_ok(), "{} should resolve", path.display());
            count += 1;
        }
    }
    assert!(count >= 4);
}

#[test]
fn test_hoc_plan_wires_allowlist_into_token() {
    let plan = load("hoc.toml");

    assert_eq!(order(&plan), vec!["Allowlist", "HomeOnChainToken"]);
    assert_eq!(plan[0].mode, DeployMode::Plain);
    let token = plan.get("HomeOnChainToken").unwrap();
    assert_eq!(token.mode, DeployMode::Proxied);
    assert_eq!(token.args, vec![ArgRef::address_of("Allowlist")]);
}

#[test]
fn test_roofstock_plans_differ_only_in_passport() {
    let goerli = load("roofstock.toml");
    let mainnet = load("roofstock-mainnet.toml");

    assert_eq!(order(&goerli), vec!["RoofstockOnChainKyc", "HomeOnChainToken"]);
    assert_eq!(order(&mainnet), order(&goerli));
    assert_ne!(goerli[0].args, mainnet[0].args);
    assert_eq!(goerli[1], mainnet[1]);
}

#[test]
fn test_single_token_plans() {
    for (file, name) in [
        ("kyc.toml", "KycOnChainToken"),
        ("membership.toml", "RoofstockOnChainMembershipToken"),
    ] {
        let plan = load(file);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].name, name);
        assert_eq!(plan[0].mode, DeployMode::Proxied);
        assert!(plan[0].args.is_empty());
    }
}

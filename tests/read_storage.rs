//! This module is an integration test that tests reading and decoding the
//! storage of a contract through the full extractor pipeline.
#![cfg(test)]

use ethnum::U256;
use storage_layout_builder as slb;
use storage_layout_builder::{layout::Config, utility::{hash_slot, U256Wrapper}};

use crate::common::{word, MemoryTransport};

mod common;

const OWNER: &str = "5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
const TOKEN: &str = "fb6916095ca1df60bb79ce92ce3ea74c37c5d359";

fn address(hex: &str) -> U256 {
    U256::from_str_radix(hex, 16).unwrap_or_default()
}

fn vault_storage() -> MemoryTransport {
    let slot_0 = address(OWNER) | (U256::ONE << 160u32) | (U256::ONE << 168u32);
    let slot_2 = U256::from(1_000u32) | (U256::from(42u32) << 128u32) | (U256::ONE << 192u32);
    let slot_5 = U256::from(10u32) | (U256::from(20u32) << 32u32) | (U256::from(30u32) << 64u32);
    let history = hash_slot(word(3));

    MemoryTransport::new()
        .with_slot(word(0), U256Wrapper(slot_0))
        .with_slot(word(1), common::short_string("vault"))
        .with_slot(word(2), U256Wrapper(slot_2))
        .with_slot(word(3), word(2))
        .with_slot(history, word(7))
        .with_slot(U256Wrapper(history.0 + U256::ONE), word(9))
        .with_slot(word(5), U256Wrapper(slot_5))
        .with_slot(word(6), U256Wrapper(address(TOKEN)))
}

fn decoded(variables: &[slb::Variable]) -> Vec<Option<&str>> {
    variables.iter().map(|v| v.decoded_value.as_deref()).collect()
}

#[tokio::test]
async fn reads_and_decodes_vault_storage() -> anyhow::Result<()> {
    let universe = common::new_universe_from_file("./tests/asset/Vault.json")?;
    let mut client = common::new_client(vault_storage());

    let layout = slb::new(&universe).extract("Vault", None, &mut client).await?;

    assert_eq!(layout.root().address.as_deref(), Some(common::CONTRACT_ADDRESS));
    assert_eq!(
        decoded(&layout.root().variables),
        vec![
            Some("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"),
            Some("true"),
            Some("Active"),
            Some("vault"),
            None,
            Some("2"),
            None,
            None,
            Some("0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359"),
        ]
    );

    let position = layout.referenced_by("position").unwrap();
    assert_eq!(decoded(&position.variables), vec![Some("1,000"), Some("42"), Some("true")]);

    let history = layout.referenced_by("history").unwrap();
    assert_eq!(history.array_length, Some(2));
    assert_eq!(decoded(&history.variables), vec![Some("7"), Some("9")]);

    let limits = layout.referenced_by("limits").unwrap();
    assert_eq!(decoded(&limits.variables), vec![Some("10"), Some("20"), Some("30")]);

    let balances = layout.referenced_by("balances").unwrap();
    assert!(balances.variables.iter().all(|v| v.raw_slot_value.is_none()));

    // One batch for the contract, and one for each readable section beneath it
    assert_eq!(client.transport().batch_count(), 4);

    Ok(())
}

#[tokio::test]
async fn reuses_cached_values_within_a_session() -> anyhow::Result<()> {
    let universe = common::new_universe_from_file("./tests/asset/Vault.json")?;
    let mut client = common::new_client(vault_storage());

    let first = slb::new(&universe).extract("Vault", None, &mut client).await?;
    let batches = client.transport().batch_count();
    let requests = client.transport().request_count();

    let second = slb::new(&universe).extract("Vault", None, &mut client).await?;
    assert_eq!(first, second);
    assert_eq!(client.transport().batch_count(), batches);
    assert_eq!(client.transport().request_count(), requests);

    Ok(())
}

#[tokio::test]
async fn expands_long_strings() -> anyhow::Result<()> {
    let universe = common::new_universe_from_file("./tests/asset/Vault.json")?;

    // 40 bytes of text is stored in long form over two slots
    let text = "a name far too long to fit in one slot!!";
    let data = hash_slot(word(1));
    let mut first = [0u8; 32];
    first.copy_from_slice(&text.as_bytes()[..32]);
    let mut second = [0u8; 32];
    second[..8].copy_from_slice(&text.as_bytes()[32..]);

    let transport = vault_storage()
        .with_slot(word(1), word(81))
        .with_slot(data, U256Wrapper::from_be_bytes(first))
        .with_slot(U256Wrapper(data.0 + U256::ONE), U256Wrapper::from_be_bytes(second));
    let mut client = common::new_client(transport);

    let layout = slb::new(&universe).extract("Vault", None, &mut client).await?;

    assert_eq!(layout.variable("name").unwrap().decoded_value, None);
    let name = layout.referenced_by("name").unwrap();
    assert_eq!(name.name, "string: name");
    assert_eq!(name.array_length, Some(40));
    let chunks: String = name.variables.iter().filter_map(|v| v.decoded_value.clone()).collect();
    assert_eq!(chunks, text);

    Ok(())
}

#[tokio::test]
async fn caps_dynamic_array_expansion() -> anyhow::Result<()> {
    let universe = common::new_universe_from_file("./tests/asset/Vault.json")?;
    let transport = vault_storage().with_slot(word(3), word(1_000_000));
    let mut client = common::new_client(transport);

    let layout = slb::new(&universe)
        .with_config(Config::default().with_maximum_array_expansion(4))
        .extract("Vault", None, &mut client)
        .await?;

    let history = layout.referenced_by("history").unwrap();
    assert_eq!(history.variables.len(), 4);
    assert_eq!(history.array_length, Some(1_000_000));
    assert_eq!(layout.variable("history").unwrap().decoded_value.as_deref(), Some("1,000,000"));

    Ok(())
}

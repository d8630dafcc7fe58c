// Keygate — CLI Command Handlers
//
// Each function handles one CLI subcommand: open the session, run one
// provider round trip, print the outcome. The session is torn down before
// the process exits so the dispatch thread is always joined.

use crate::error::KeygateError;
use crate::model::{CryptoObjectUid, SlotNumber};
use crate::proxy::KeyStorageProvider;
use crate::session::{self, SessionConfig};
use crate::tree::parse_uuid;

use super::{Cli, Commands};

/// Execute the parsed CLI command against the process-wide session.
pub fn execute(cli: Cli) -> Result<(), KeygateError> {
    let mut config = SessionConfig::default();
    if let Some(socket) = cli.socket {
        config.socket_path = socket;
    }

    let handler = session::init(config)?;
    handler.initialize()?;
    let provider = handler.key_storage_provider();

    let outcome = run(&*provider, cli.command);
    session::reset();
    outcome
}

/// Dispatch one subcommand against any provider implementation.
fn run(provider: &dyn KeyStorageProvider, command: Commands) -> Result<(), KeygateError> {
    match command {
        Commands::Find { generator, version } => {
            let uid = CryptoObjectUid {
                generator: parse_uuid(&generator)?,
                version_stamp: version,
            };
            let slot = provider.find_slot(&uid)?;
            println!("{}", slot);
        }

        Commands::Empty { slot } => {
            if provider.is_empty(slot)? {
                println!("Slot {} is empty", slot);
            } else {
                println!("Slot {} holds an object", slot);
            }
        }

        Commands::Content { slot } => {
            let props = provider.get_content_props(slot)?;
            println!("Content of slot {}:\n", slot);
            println!("  Type:        {}", props.object_type.as_str());
            println!("  Identity:    {}", props.object_uid);
            println!("  Size:        {} bytes", props.object_size);
            println!("  Exportable:  {}", props.is_exportable);
            println!("  Session:     {}", props.is_session);
        }

        Commands::Prototype { slot } => {
            let props = provider.get_prototyped_props(slot)?;
            println!("Prototype of slot {}:\n", slot);
            println!("  Object type:   {}", props.object_type.as_str());
            println!("  Algorithm id:  {:#x}", props.alg_id);
            println!("  Capacity:      {} bytes", props.max_object_size);
            println!("  Allowed usage: {:#b}", props.allowed_usage);
            println!("  Exportable:    {}", props.is_exportable);
        }

        Commands::Owner { slot } => {
            println!("{}", provider.get_owner(slot)?);
        }

        Commands::ProviderUid { slot } => {
            match provider.get_default_crypto_provider_uid(slot)? {
                Some(uid) => println!("{}", uid),
                None => println!("No default crypto provider bound to slot {}", slot),
            }
        }

        Commands::Referring { slot } => {
            let mut cursor: Option<SlotNumber> = None;
            let mut found_any = false;
            while let Some(found) = provider.find_referring_slot(slot, cursor)? {
                println!("{}", found);
                found_any = true;
                cursor = Some(found);
            }
            if !found_any {
                println!("No slots reference slot {}", slot);
            }
        }

        Commands::Clear { slot } => {
            provider.clear(slot)?;
            println!("✓ Slot {} cleared", slot);
        }
    }

    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{usage, ContentProps, ObjectType, PrototypeProps, SlotType};
    use crate::proxy::KeyStorageProxy;
    use crate::session::mock::{MockSession, SlotRecord};
    use crate::session::SessionAccess;
    use std::sync::Arc;
    use uuid::Uuid;

    fn mock_provider() -> (KeyStorageProxy, Arc<MockSession>) {
        let (session, store) = MockSession::new();
        let mut record = SlotRecord::new(PrototypeProps {
            slot_type: SlotType::Application,
            object_type: ObjectType::SymmetricKey,
            alg_id: 1,
            max_object_size: 128,
            allowed_usage: usage::ENCRYPT,
            is_exportable: false,
        });
        record.payload = Some(
            ContentProps {
                object_type: ObjectType::SymmetricKey,
                object_uid: CryptoObjectUid {
                    generator: Uuid::from_u128(7),
                    version_stamp: 1,
                },
                object_size: 16,
                is_exportable: false,
                is_session: false,
            }
            .to_tree(),
        );
        store.seed_slot(SlotNumber::new(1), record);

        let dyn_session: Arc<dyn SessionAccess> = session.clone();
        (KeyStorageProxy::new(Arc::downgrade(&dyn_session)), session)
    }

    #[test]
    fn test_run_empty_and_content() {
        let (provider, _session) = mock_provider();
        assert!(run(&provider, Commands::Empty { slot: SlotNumber::new(1) }).is_ok());
        assert!(run(&provider, Commands::Content { slot: SlotNumber::new(1) }).is_ok());
        assert!(run(&provider, Commands::Prototype { slot: SlotNumber::new(1) }).is_ok());
        assert!(run(&provider, Commands::Owner { slot: SlotNumber::new(1) }).is_ok());
    }

    #[test]
    fn test_run_find_reports_malformed_uuid() {
        let (provider, _session) = mock_provider();
        let err = run(
            &provider,
            Commands::Find {
                generator: "garbage".to_string(),
                version: 0,
            },
        )
        .unwrap_err();
        assert!(matches!(err, KeygateError::InvalidArgument(_)));
    }

    #[test]
    fn test_run_surfaces_missing_slot() {
        let (provider, _session) = mock_provider();
        let err = run(&provider, Commands::Clear { slot: SlotNumber::new(9) }).unwrap_err();
        assert!(matches!(err, KeygateError::UnreservedResource(_)));
    }

    #[test]
    fn test_run_referring_handles_empty_result() {
        let (provider, _session) = mock_provider();
        assert!(run(&provider, Commands::Referring { slot: SlotNumber::new(1) }).is_ok());
    }
}

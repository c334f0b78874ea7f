//
// Copyright (c) 2025 rustmailer.com (https://rustmailer.com)
//
// This file is part of the Bichon Email Archiving Project
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use mailpost::{
    modules::{
        database::manager::NativeRowStore,
        error::{code::ErrorCode, MailpostResult},
        indexer::{executor::ScanOutcome, manager::IndexManager},
        logger,
        message::search::{search_messages_impl, SearchRequest},
        settings::cli::{parse_flags, Command, IdSet, Settings},
    },
    raise_error,
};
use mimalloc::MiMalloc;
use tracing::{error, info, warn};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> MailpostResult<()> {
    let settings = Settings::parse();
    let _guard = logger::initialize_logging(&settings)?;
    info!("Starting mailpost");
    info!("Version:  {}", env!("CARGO_PKG_VERSION"));

    if let Err(error) = run(settings).await {
        error!(code = %error.code(), retriable = error.code().is_retriable(), "{}", error);
        eprintln!("{:?}", error);
        return Err(error);
    }
    Ok(())
}

async fn run(settings: Settings) -> MailpostResult<()> {
    tokio::task::spawn_blocking(move || execute(settings))
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
}

fn execute(settings: Settings) -> MailpostResult<()> {
    let store = NativeRowStore::open(settings.database_path(), settings.mailpost_cache_size)?;
    let manager = IndexManager::new(Arc::new(store), settings.index_options());

    match settings.command {
        Command::Index {
            mailbox,
            id,
            flags,
            internal_date,
            file,
        } => {
            let raw = std::fs::read(&file)?;
            let flags = parse_flags(flags.as_deref())?;
            let internal_date = internal_date.unwrap_or_else(|| Utc::now().timestamp_millis());
            manager
                .index_raw_message(&mailbox, id, &flags, &raw, internal_date)
                .inspect_err(|e| error!(mailbox = %mailbox, id, "indexing failed: {}", e))?;
            info!(mailbox = %mailbox, id, file = ?file, "message indexed");
        }
        Command::Search(args) => {
            let request = SearchRequest::new(args.mailbox, args.criteria()?);
            print_outcome(&search_messages_impl(&manager, request)?, args.json)?;
        }
        Command::Delete {
            mailbox,
            ids: IdSet(ranges),
        } => {
            let report = manager.delete_messages(&mailbox, &ranges);
            println!("removed {} cells, {} failures", report.removed, report.failed);
        }
        Command::Flags {
            mailbox,
            ids: IdSet(ranges),
            flags,
        } => {
            let flags = parse_flags(Some(&flags))?;
            let updated = manager.update_flags_many(&mailbox, &ranges, &flags);
            println!("updated {} messages", updated);
        }
        Command::List { mailbox, json } => {
            print_outcome(&manager.list_message_ids(&mailbox)?, json)?;
        }
    }
    Ok(())
}

fn print_outcome(outcome: &ScanOutcome, json: bool) -> MailpostResult<()> {
    if !outcome.complete {
        warn!("scan was interrupted, results are partial");
    }
    if json {
        let body = serde_json::json!({
            "message_ids": outcome.sorted_ids(),
            "complete": outcome.complete,
        });
        println!("{}", body);
        return Ok(());
    }
    for id in outcome.sorted_ids() {
        println!("{}", id);
    }
    Ok(())
}

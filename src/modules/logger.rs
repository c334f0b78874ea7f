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

use std::path::PathBuf;

use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    fmt::{self, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::{
    modules::{
        error::{code::ErrorCode, MailpostResult},
        settings::cli::Settings,
    },
    raise_error,
};

/// Installs the global subscriber. Keep the returned guard alive for the life
/// of the process when logging to a file, or buffered lines are lost.
pub fn initialize_logging(settings: &Settings) -> MailpostResult<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(&settings.mailpost_log_level).map_err(|e| {
        raise_error!(
            format!("Invalid log level {:?}: {}", settings.mailpost_log_level, e),
            ErrorCode::InvalidParameter
        )
    })?;

    let (writer, guard) = if settings.mailpost_log_to_file {
        let dir = PathBuf::from(&settings.mailpost_root_dir).join("logs");
        std::fs::create_dir_all(&dir)?;
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("mailpost")
            .filename_suffix("log")
            .max_log_files(settings.mailpost_max_server_log_files)
            .build(&dir)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        let (writer, guard) = tracing_appender::non_blocking(appender);
        (BoxMakeWriter::new(writer), Some(guard))
    } else {
        (BoxMakeWriter::new(std::io::stdout), None)
    };

    let ansi = settings.mailpost_ansi_logs && !settings.mailpost_log_to_file;
    let layer = fmt::layer().with_writer(writer).with_ansi(ansi);
    let result = if settings.mailpost_json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init()
    };
    result.map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
    Ok(guard)
}

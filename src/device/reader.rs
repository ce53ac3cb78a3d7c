use std::time::Duration;
use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use crate::device::connection::{
    report_warning, sleep_unless_cancelled, ConnectOutcome, ConnectionManager,
};
use crate::device::events::EventSink;
use crate::device::report::decode_packet;

/// Connect to the scale and read from it until `cancel` is cancelled. A failed read drops the
/// connection and connects again; nothing is emitted once `cancel` has been observed.
pub async fn read_scale(
    manager: ConnectionManager,
    mut sink: EventSink,
    read_interval: Duration,
    cancel: CancellationToken,
) {
    let mut connection = match manager.connect(&mut sink).await {
        ConnectOutcome::Connected(connection) => connection,
        ConnectOutcome::Aborted => return,
    };

    debug!("Reader started");

    while !cancel.is_cancelled() {
        let result = connection.device.read(connection.endpoint).await;

        // stop() may have been called while the read was blocked
        if cancel.is_cancelled() {
            break;
        }

        match result {
            Err(err) => {
                report_warning(&mut sink, &format!("Read operation from scale failed: {}", err)).await;
                drop(connection);
                debug!("Disconnected from scale");

                connection = match manager.connect(&mut sink).await {
                    ConnectOutcome::Connected(connection) => connection,
                    ConnectOutcome::Aborted => break,
                };
                continue;
            },
            Ok(packet) => match decode_packet(&packet) {
                Ok(reading) => {
                    debug!("Read {} {}", reading.weight, reading.units);
                    sink.emit(reading).await;
                },
                Err(err) => warn!("Ignoring report from scale: {}", err),
            },
        }

        sleep_unless_cancelled(&cancel, read_interval).await;
    }

    debug!("Reader completed");
}

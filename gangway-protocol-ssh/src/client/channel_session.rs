use bytes::Bytes;
use russh::client::Msg;
use russh::Channel;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::*;
use gangway_common::SessionId;

use super::error::SshClientError;
use crate::{RSEvent, ShellOperation};

/// Relay task for the single shell channel of a session. Ops arrive from
/// the session queue; channel messages are lifted back as events.
pub struct ShellChannel {
    client_channel: Channel<Msg>,
    ops_rx: UnboundedReceiver<ShellOperation>,
    events_tx: UnboundedSender<RSEvent>,
    session_id: SessionId,
}

impl ShellChannel {
    pub fn new(
        client_channel: Channel<Msg>,
        ops_rx: UnboundedReceiver<ShellOperation>,
        events_tx: UnboundedSender<RSEvent>,
        session_id: SessionId,
    ) -> Self {
        ShellChannel {
            client_channel,
            ops_rx,
            events_tx,
            session_id,
        }
    }

    pub async fn run(mut self) -> Result<(), SshClientError> {
        loop {
            tokio::select! {
                incoming = self.ops_rx.recv() => {
                    match incoming {
                        Some(ShellOperation::Data(data)) => {
                            self.client_channel.data(&*data).await?;
                        }
                        Some(ShellOperation::ResizePty { rows, cols }) => {
                            self.client_channel.window_change(cols, rows, 0, 0).await?;
                        }
                        Some(ShellOperation::Close) => break,
                        None => break,
                    }
                }
                channel_event = self.client_channel.wait() => {
                    match channel_event {
                        Some(russh::ChannelMsg::Data { data }) => {
                            let bytes: &[u8] = &data;
                            self.events_tx.send(RSEvent::Output(
                                Bytes::from(bytes.to_vec()),
                            )).map_err(|_| SshClientError::MpscError)?;
                        }
                        Some(russh::ChannelMsg::ExtendedData { data, ext: _ }) => {
                            // stderr shares the terminal stream
                            let bytes: &[u8] = &data;
                            self.events_tx.send(RSEvent::Output(
                                Bytes::from(bytes.to_vec()),
                            )).map_err(|_| SshClientError::MpscError)?;
                        }
                        Some(russh::ChannelMsg::Eof) => {
                            self.events_tx.send(RSEvent::Eof).map_err(|_| SshClientError::MpscError)?;
                        }
                        Some(russh::ChannelMsg::Close) => {
                            self.events_tx.send(RSEvent::Close).map_err(|_| SshClientError::MpscError)?;
                        }
                        Some(russh::ChannelMsg::ExitStatus { exit_status }) => {
                            debug!(session=%self.session_id, exit_status, "Shell exited");
                        }
                        Some(russh::ChannelMsg::WindowAdjusted { .. }) => {}
                        Some(msg) => {
                            debug!(session=%self.session_id, "unhandled channel message: {:?}", msg);
                        }
                        None => {
                            self.events_tx.send(RSEvent::Close).map_err(|_| SshClientError::MpscError)?;
                            break
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl Drop for ShellChannel {
    fn drop(&mut self) {
        debug!(session=%self.session_id, "Shell channel closed");
    }
}

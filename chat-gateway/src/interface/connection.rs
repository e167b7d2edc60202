//! 连接处理模块
//!
//! 每个 WebSocket 连接由一对任务驱动：
//! - 读任务：读取入站帧并提交给 Hub 分发
//! - 写任务：从有界发送队列取出帧写入 socket，并定时发送心跳
//!
//! 任一端出错都会关闭整个连接并从 Hub 注销。

use std::fmt::Display;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tracing::{debug, info, warn};

use crate::application::Hub;
use crate::domain::model::{
    AuthenticatedUser, CloseSignal, ConnectionHandle, ConnectionKey, InboundFrame, OutboundFrame,
};

/// 连接参数
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub outbound_queue_capacity: usize,
    pub ping_interval: Duration,
    pub pong_wait: Duration,
    pub write_timeout: Duration,
}

/// 驱动单个连接直到关闭
///
/// `sink` / `stream` 为 socket 拆分后的写端与读端。
pub async fn run_connection<W, R, E>(
    sink: W,
    stream: R,
    user: AuthenticatedUser,
    hub: Hub,
    settings: ConnectionSettings,
) where
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin + Send,
    E: Display,
{
    let key = ConnectionKey::new(user.user_id.clone());
    let (outbox_tx, outbox_rx) = mpsc::channel(settings.outbound_queue_capacity.max(1));
    let close_signal = CloseSignal::new();

    let handle = ConnectionHandle::new(
        key.clone(),
        user.display_name.clone(),
        outbox_tx,
        close_signal.clone(),
    );
    if let Err(err) = hub.register(handle).await {
        warn!(connection = %key, error = %err, "Failed to register connection");
        return;
    }

    let writer = tokio::spawn(write_pump(
        sink,
        outbox_rx,
        close_signal.clone(),
        hub.clone(),
        key.clone(),
        settings.clone(),
    ));

    read_pump(stream, &user, &close_signal, &hub, settings.pong_wait).await;

    close_signal.close();
    if let Err(err) = hub.unregister(key.clone()).await {
        debug!(connection = %key, error = %err, "Hub unavailable during unregister");
    }
    if let Err(err) = writer.await {
        warn!(connection = %key, error = %err, "Writer task panicked");
    }
    info!(connection = %key, "Connection closed");
}

/// 读任务
async fn read_pump<R, E>(
    mut stream: R,
    user: &AuthenticatedUser,
    close_signal: &CloseSignal,
    hub: &Hub,
    pong_wait: Duration,
) where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let mut closed = close_signal.subscribe();
    loop {
        // 任意入站帧（含 Pong）都会刷新超时
        let next = tokio::select! {
            biased;
            _ = wait_closed(&mut closed) => break,
            next = timeout(pong_wait, stream.next()) => next,
        };

        let message = match next {
            Err(_) => {
                debug!(user_id = %user.user_id, "Keepalive timeout");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(err))) => {
                debug!(user_id = %user.user_id, error = %err, "Read error");
                break;
            }
            Ok(Some(Ok(message))) => message,
        };

        let payload = match message {
            Message::Text(text) => text.as_str().as_bytes().to_vec(),
            Message::Binary(bytes) => bytes.to_vec(),
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        if hub
            .dispatch(InboundFrame::from_user(user.clone(), payload))
            .await
            .is_err()
        {
            warn!(user_id = %user.user_id, "Hub stopped, closing connection");
            break;
        }
    }
}

/// 写任务
async fn write_pump<W>(
    mut sink: W,
    mut outbox: mpsc::Receiver<OutboundFrame>,
    close_signal: CloseSignal,
    hub: Hub,
    key: ConnectionKey,
    settings: ConnectionSettings,
) where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let mut closed = close_signal.subscribe();
    let mut ping = interval_at(Instant::now() + settings.ping_interval, settings.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let message = tokio::select! {
            biased;
            _ = wait_closed(&mut closed) => break,
            frame = outbox.recv() => match frame {
                Some(frame) => Message::Text(frame.to_string().into()),
                // 队列已关闭（连接被注销）
                None => break,
            },
            _ = ping.tick() => Message::Ping(Bytes::new()),
        };

        match timeout(settings.write_timeout, sink.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                debug!(connection = %key, error = %err, "Write error");
                break;
            }
            Err(_) => {
                debug!(connection = %key, "Write timeout");
                break;
            }
        }
    }

    let _ = timeout(settings.write_timeout, sink.send(Message::Close(None))).await;
    close_signal.close();
    if hub.unregister(key.clone()).await.is_err() {
        debug!(connection = %key, "Hub unavailable during unregister");
    }
}

async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    // 发送端被释放同样视为关闭
    let _ = closed.wait_for(|closed| *closed).await;
}

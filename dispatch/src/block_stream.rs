//! Incremental reads of one serialized block from one node.
//!
//! A [`BlockStream`] is a forward-only, finite stream of byte chunks backed
//! by a single node's response body. Chunks are handed out as they arrive;
//! nothing is buffered beyond the chunk in hand. A body that fails or stays
//! silent for longer than the node's timeout ends the stream with
//! [`BlockStreamError::Interrupted`], after every intact chunk was yielded.
//! The connection is released as soon as the stream ends, fails, or is
//! dropped.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::{Stream, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::{Instant, Sleep};

use multinode_rpc::{ChunkStream, RpcError};
use multinode_types::{BlockHash, NodeId};

use crate::{AggregateError, CancelToken, ConfiguredNode, NodeRef};

#[derive(Debug, Error)]
pub enum BlockStreamError {
    #[error("block {hash} not found on {node}")]
    NotFound { hash: BlockHash, node: NodeId },

    #[error("could not open block {hash} on {node}: {source}")]
    Open {
        hash: BlockHash,
        node: NodeId,
        source: RpcError,
    },

    #[error("block {hash} from {node} interrupted after {bytes_read} bytes: {detail}")]
    Interrupted {
        hash: BlockHash,
        node: NodeId,
        bytes_read: u64,
        detail: String,
    },

    #[error("block stream cancelled")]
    Cancelled,

    /// The operation deadline expired before the stream was open.
    #[error("block stream not open after {0:?}")]
    Deadline(Duration),

    /// No node could be chosen to serve the block.
    #[error("node selection failed: {0}")]
    Selection(#[from] AggregateError),

    #[error("write failed: {0}")]
    Sink(#[from] std::io::Error),
}

pub struct BlockStream {
    hash: BlockHash,
    node: NodeRef,
    inner: Option<ChunkStream>,
    bytes_read: u64,
    idle_timeout: Duration,
    idle: Pin<Box<Sleep>>,
    /// The idle deadline is armed for the current wait. Cleared on every
    /// yield, so time spent by the consumer between polls is not counted.
    waiting: bool,
    cancelled: Option<BoxFuture<'static, ()>>,
}

impl BlockStream {
    /// Open the block on `node`. Opening is bounded by the node's timeout,
    /// which then also bounds the silence between two chunks.
    pub async fn open(node: &ConfiguredNode, hash: BlockHash) -> Result<Self, BlockStreamError> {
        let limit = node.endpoint().timeout;
        let client = node.client();
        let opened = match tokio::time::timeout(limit, client.get_block_stream(&hash)).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::Timeout(limit)),
        };
        let inner = match opened {
            Ok(inner) => inner,
            Err(RpcError::NotFound(_)) => {
                return Err(BlockStreamError::NotFound {
                    hash,
                    node: node.id().clone(),
                })
            }
            Err(source) => {
                tracing::warn!(node = %node.id(), %hash, error = %source, "block stream open failed");
                return Err(BlockStreamError::Open {
                    hash,
                    node: node.id().clone(),
                    source,
                });
            }
        };

        tracing::debug!(node = %node.id(), %hash, "block stream opened");
        Ok(Self {
            hash,
            node: node.node_ref().clone(),
            inner: Some(inner),
            bytes_read: 0,
            idle_timeout: limit,
            idle: Box::pin(tokio::time::sleep(limit)),
            waiting: false,
            cancelled: None,
        })
    }

    /// End the stream with [`BlockStreamError::Cancelled`] once `token`
    /// is cancelled.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancelled = Some(Box::pin(async move { token.cancelled().await }));
        self
    }

    pub fn hash(&self) -> &BlockHash {
        &self.hash
    }

    /// The node serving the block.
    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    /// Bytes yielded so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// True once the stream ended, failed, or was closed.
    pub fn is_finished(&self) -> bool {
        self.inner.is_none()
    }

    pub async fn next_chunk(&mut self) -> Option<Result<Vec<u8>, BlockStreamError>> {
        self.next().await
    }

    /// Release the underlying connection without reading further.
    pub fn close(mut self) {
        self.release("closed by caller");
    }

    /// Copy the remaining chunks into `sink`; returns the bytes written.
    pub async fn write_to<W>(&mut self, sink: &mut W) -> Result<u64, BlockStreamError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut written = 0u64;
        while let Some(chunk) = self.next().await {
            let chunk = chunk?;
            sink.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        sink.flush().await?;
        Ok(written)
    }

    fn release(&mut self, why: &str) {
        if self.inner.take().is_some() {
            tracing::debug!(
                node = %self.node,
                hash = %self.hash,
                bytes_read = self.bytes_read,
                why,
                "block stream released"
            );
        }
    }

    fn interrupted(&mut self, detail: String) -> BlockStreamError {
        self.inner = None;
        tracing::warn!(
            node = %self.node,
            hash = %self.hash,
            bytes_read = self.bytes_read,
            %detail,
            "block stream interrupted"
        );
        BlockStreamError::Interrupted {
            hash: self.hash,
            node: self.node.id.clone(),
            bytes_read: self.bytes_read,
            detail,
        }
    }
}

impl Stream for BlockStream {
    type Item = Result<Vec<u8>, BlockStreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.inner.is_none() {
            return Poll::Ready(None);
        }
        if let Some(cancelled) = this.cancelled.as_mut() {
            if cancelled.as_mut().poll(cx).is_ready() {
                this.cancelled = None;
                this.release("cancelled by caller");
                return Poll::Ready(Some(Err(BlockStreamError::Cancelled)));
            }
        }
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.bytes_read += chunk.len() as u64;
                this.waiting = false;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(this.interrupted(e.to_string())))),
            Poll::Ready(None) => {
                tracing::debug!(
                    node = %this.node,
                    hash = %this.hash,
                    bytes_read = this.bytes_read,
                    "block stream complete"
                );
                this.inner = None;
                Poll::Ready(None)
            }
            Poll::Pending => {
                if !this.waiting {
                    this.waiting = true;
                    let deadline = Instant::now() + this.idle_timeout;
                    this.idle.as_mut().reset(deadline);
                }
                match this.idle.as_mut().poll(cx) {
                    Poll::Ready(()) => {
                        let detail = format!("no data for {:?}", this.idle_timeout);
                        Poll::Ready(Some(Err(this.interrupted(detail))))
                    }
                    Poll::Pending => Poll::Pending,
                }
            }
        }
    }
}

impl Drop for BlockStream {
    fn drop(&mut self) {
        self.release("dropped before end");
    }
}

impl std::fmt::Debug for BlockStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockStream")
            .field("hash", &self.hash)
            .field("node", &self.node)
            .field("bytes_read", &self.bytes_read)
            .field("finished", &self.inner.is_none())
            .finish()
    }
}

//! Single-consumer mailbox with an explicit end-of-stream letter
//!
//! Any number of [`MailboxSender`]s may `put`; exactly one [`Mailbox`]
//! `take`s in FIFO order. `close` appends a terminal letter, so the consumer
//! sees every item put before the close and then `None`. The mailbox is
//! single-shot: once the terminal letter has been taken it stays closed.

use tokio::sync::mpsc;
use tracing::debug;

enum Letter<T> {
    Item(T),
    Closed,
}

/// Producer half; cheap to clone.
pub struct MailboxSender<T> {
    tx: mpsc::UnboundedSender<Letter<T>>,
}

impl<T> Clone for MailboxSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

/// Consumer half.
pub struct Mailbox<T> {
    rx: mpsc::UnboundedReceiver<Letter<T>>,
    closed: bool,
}

/// Create a connected sender/mailbox pair.
pub fn channel<T>() -> (MailboxSender<T>, Mailbox<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MailboxSender { tx }, Mailbox { rx, closed: false })
}

impl<T> MailboxSender<T> {
    /// Append an item and wake the consumer.
    pub fn put(&self, item: T) {
        if self.tx.send(Letter::Item(item)).is_err() {
            debug!("mailbox consumer gone, dropping item");
        }
    }

    /// Append the end-of-stream letter.
    pub fn close(&self) {
        let _ = self.tx.send(Letter::Closed);
    }
}

impl<T> Mailbox<T> {
    /// Wait for the next item; `None` once the mailbox is closed.
    ///
    /// Dropping every sender without calling `close` also ends the stream.
    pub async fn take(&mut self) -> Option<T> {
        if self.closed {
            return None;
        }
        match self.rx.recv().await {
            Some(Letter::Item(item)) => Some(item),
            Some(Letter::Closed) | None => {
                self.closed = true;
                self.rx.close();
                None
            }
        }
    }

    /// Non-blocking `take`: `None` when nothing is queued or the mailbox is closed.
    pub fn try_take(&mut self) -> Option<T> {
        if self.closed {
            return None;
        }
        match self.rx.try_recv() {
            Ok(Letter::Item(item)) => Some(item),
            Ok(Letter::Closed) | Err(mpsc::error::TryRecvError::Disconnected) => {
                self.closed = true;
                self.rx.close();
                None
            }
            Err(mpsc::error::TryRecvError::Empty) => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_then_closed() {
        let (tx, mut rx) = channel();
        tx.put(1);
        tx.put(2);
        tx.close();

        assert_eq!(rx.take().await, Some(1));
        assert_eq!(rx.take().await, Some(2));
        assert_eq!(rx.take().await, None);
        assert!(rx.is_closed());
    }

    #[tokio::test]
    async fn test_stays_closed_after_end_marker() {
        let (tx, mut rx) = channel();
        tx.close();
        tx.put("late");

        assert_eq!(rx.take().await, None);
        assert_eq!(rx.take().await, None);
        assert_eq!(rx.try_take(), None);
    }

    #[tokio::test]
    async fn test_take_waits_for_producer() {
        let (tx, mut rx) = channel();
        let producer = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            tx.put("hello");
        });

        assert_eq!(rx.take().await, Some("hello"));
        producer.await.unwrap();
        // every sender dropped
        assert_eq!(rx.take().await, None);
    }

    #[tokio::test]
    async fn test_multiple_producers() {
        let (tx, mut rx) = channel();
        let tx2 = tx.clone();
        tx.put("a");
        tx2.put("b");
        tx2.close();

        assert_eq!(rx.take().await, Some("a"));
        assert_eq!(rx.take().await, Some("b"));
        assert_eq!(rx.take().await, None);
    }

    #[test]
    fn test_try_take_empty() {
        let (tx, mut rx) = channel::<u8>();
        assert_eq!(rx.try_take(), None);
        assert!(!rx.is_closed());
        tx.put(7);
        assert_eq!(rx.try_take(), Some(7));
    }
}

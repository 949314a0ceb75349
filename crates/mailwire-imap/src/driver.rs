//! The mailbox-driver trait.
//!
//! A mail front end talks to every mailbox through [`MailDriver`], so an
//! IMAP mailbox can sit beside local formats behind one `dyn` handle.

use async_trait::async_trait;
use bytes::Bytes;

use crate::Result;
use crate::cache::GcFlags;
use crate::command::{SearchProgram, SortProgram, StatusAttribute, ThreadAlgorithm};
use crate::connection::Transport;
use crate::mailbox::ImapMailbox;
use crate::types::{Body, Envelope, Flags, ListEntry, SequenceSet, StatusRecord, ThreadNode};

/// Operations a mail front end performs on an open mailbox.
#[async_trait]
pub trait MailDriver: Send + Sync {
    /// Driver name.
    fn driver_name(&self) -> &'static str;

    /// Canonical mailbox name.
    fn mailbox_name(&self) -> &str;

    /// Number of messages.
    async fn exists(&self) -> u32;

    /// Checks the connection is alive.
    async fn ping(&self) -> bool;

    /// Checkpoints the mailbox.
    async fn check(&self) -> Result<()>;

    /// Removes `\Deleted` messages.
    async fn expunge(&self) -> Result<()>;

    /// Closes the mailbox, expunging first if asked.
    async fn close(&self, expunge: bool) -> Result<()>;

    /// Loads flags, internal date and size into the cache.
    async fn fetch_fast(&self, sequence: &SequenceSet, uid: bool) -> Result<()>;

    /// Loads flags into the cache.
    async fn fetch_flags(&self, sequence: &SequenceSet, uid: bool) -> Result<()>;

    /// Envelope and optional body structure.
    async fn fetch_structure(
        &self,
        msgno: u32,
        want_body: bool,
    ) -> Result<(Option<Envelope>, Option<Body>)>;

    /// Message header.
    async fn fetch_header(&self, msgno: u32) -> Result<Bytes>;

    /// Message text.
    async fn fetch_text(&self, msgno: u32, peek: bool) -> Result<Bytes>;

    /// One body section.
    async fn fetch_section(
        &self,
        msgno: u32,
        section: &str,
        peek: bool,
        partial: Option<(u32, u32)>,
    ) -> Result<Option<Bytes>>;

    /// Adds flags.
    async fn set_flag(&self, sequence: &SequenceSet, flags: &Flags, uid: bool) -> Result<()>;

    /// Removes flags.
    async fn clear_flag(&self, sequence: &SequenceSet, flags: &Flags, uid: bool) -> Result<()>;

    /// Searches.
    async fn search(
        &self,
        charset: Option<&str>,
        program: &SearchProgram,
        uid: bool,
    ) -> Result<Vec<u32>>;

    /// Sorts.
    async fn sort(
        &self,
        charset: &str,
        search: &SearchProgram,
        program: &SortProgram,
        uid: bool,
    ) -> Result<Vec<u32>>;

    /// Threads.
    async fn thread(
        &self,
        algorithm: &ThreadAlgorithm,
        charset: &str,
        search: &SearchProgram,
        uid: bool,
    ) -> Result<Vec<ThreadNode>>;

    /// Copies messages.
    async fn copy(&self, sequence: &SequenceSet, mailbox: &str, uid: bool) -> Result<()>;

    /// Moves messages.
    async fn move_messages(&self, sequence: &SequenceSet, mailbox: &str, uid: bool)
    -> Result<()>;

    /// Appends a message.
    async fn append(
        &self,
        mailbox: &str,
        message: Bytes,
        flags: Option<Flags>,
        date: Option<String>,
    ) -> Result<()>;

    /// Drops cached data.
    async fn gc(&self, what: GcFlags);

    /// Creates a mailbox.
    async fn create(&self, mailbox: &str) -> Result<()>;

    /// Deletes a mailbox.
    async fn delete(&self, mailbox: &str) -> Result<()>;

    /// Renames a mailbox.
    async fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Subscribes.
    async fn subscribe(&self, mailbox: &str) -> Result<()>;

    /// Unsubscribes.
    async fn unsubscribe(&self, mailbox: &str) -> Result<()>;

    /// Lists mailboxes.
    async fn list(&self, reference: &str, pattern: &str) -> Result<Vec<ListEntry>>;

    /// Lists subscribed mailboxes.
    async fn lsub(&self, reference: &str, pattern: &str) -> Result<Vec<ListEntry>>;

    /// Mailbox status.
    async fn status(&self, mailbox: &str, items: &[StatusAttribute]) -> Result<StatusRecord>;

    /// UID of a message.
    async fn uid(&self, msgno: u32) -> Result<u32>;

    /// Sequence number of a UID.
    async fn msgno(&self, uid: u32) -> Result<Option<u32>>;
}

#[async_trait]
impl<T: Transport + 'static> MailDriver for ImapMailbox<T> {
    fn driver_name(&self) -> &'static str {
        "imap"
    }

    fn mailbox_name(&self) -> &str {
        self.name()
    }

    async fn exists(&self) -> u32 {
        Self::exists(self).await
    }

    async fn ping(&self) -> bool {
        Self::ping(self).await
    }

    async fn check(&self) -> Result<()> {
        Self::check(self).await
    }

    async fn expunge(&self) -> Result<()> {
        Self::expunge(self).await
    }

    async fn close(&self, expunge: bool) -> Result<()> {
        Self::close(self, expunge).await
    }

    async fn fetch_fast(&self, sequence: &SequenceSet, uid: bool) -> Result<()> {
        Self::fetch_fast(self, sequence, uid).await
    }

    async fn fetch_flags(&self, sequence: &SequenceSet, uid: bool) -> Result<()> {
        Self::fetch_flags(self, sequence, uid).await
    }

    async fn fetch_structure(
        &self,
        msgno: u32,
        want_body: bool,
    ) -> Result<(Option<Envelope>, Option<Body>)> {
        Self::fetch_structure(self, msgno, want_body).await
    }

    async fn fetch_header(&self, msgno: u32) -> Result<Bytes> {
        Self::fetch_header(self, msgno).await
    }

    async fn fetch_text(&self, msgno: u32, peek: bool) -> Result<Bytes> {
        Self::fetch_text(self, msgno, peek).await
    }

    async fn fetch_section(
        &self,
        msgno: u32,
        section: &str,
        peek: bool,
        partial: Option<(u32, u32)>,
    ) -> Result<Option<Bytes>> {
        Self::fetch_section(self, msgno, section, peek, partial).await
    }

    async fn set_flag(&self, sequence: &SequenceSet, flags: &Flags, uid: bool) -> Result<()> {
        Self::set_flag(self, sequence, flags, uid).await
    }

    async fn clear_flag(&self, sequence: &SequenceSet, flags: &Flags, uid: bool) -> Result<()> {
        Self::clear_flag(self, sequence, flags, uid).await
    }

    async fn search(
        &self,
        charset: Option<&str>,
        program: &SearchProgram,
        uid: bool,
    ) -> Result<Vec<u32>> {
        Self::search(self, charset, program, uid).await
    }

    async fn sort(
        &self,
        charset: &str,
        search: &SearchProgram,
        program: &SortProgram,
        uid: bool,
    ) -> Result<Vec<u32>> {
        Self::sort(self, charset, search, program, uid).await
    }

    async fn thread(
        &self,
        algorithm: &ThreadAlgorithm,
        charset: &str,
        search: &SearchProgram,
        uid: bool,
    ) -> Result<Vec<ThreadNode>> {
        Self::thread(self, algorithm, charset, search, uid).await
    }

    async fn copy(&self, sequence: &SequenceSet, mailbox: &str, uid: bool) -> Result<()> {
        Self::copy(self, sequence, mailbox, uid).await
    }

    async fn move_messages(
        &self,
        sequence: &SequenceSet,
        mailbox: &str,
        uid: bool,
    ) -> Result<()> {
        Self::move_messages(self, sequence, mailbox, uid).await
    }

    async fn append(
        &self,
        mailbox: &str,
        message: Bytes,
        flags: Option<Flags>,
        date: Option<String>,
    ) -> Result<()> {
        Self::append(self, mailbox, message, flags, date).await
    }

    async fn gc(&self, what: GcFlags) {
        Self::gc(self, what).await;
    }

    async fn create(&self, mailbox: &str) -> Result<()> {
        Self::create(self, mailbox).await
    }

    async fn delete(&self, mailbox: &str) -> Result<()> {
        Self::delete(self, mailbox).await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        Self::rename(self, from, to).await
    }

    async fn subscribe(&self, mailbox: &str) -> Result<()> {
        Self::subscribe(self, mailbox).await
    }

    async fn unsubscribe(&self, mailbox: &str) -> Result<()> {
        Self::unsubscribe(self, mailbox).await
    }

    async fn list(&self, reference: &str, pattern: &str) -> Result<Vec<ListEntry>> {
        Self::list(self, reference, pattern).await
    }

    async fn lsub(&self, reference: &str, pattern: &str) -> Result<Vec<ListEntry>> {
        Self::lsub(self, reference, pattern).await
    }

    async fn status(&self, mailbox: &str, items: &[StatusAttribute]) -> Result<StatusRecord> {
        Self::status(self, mailbox, items).await
    }

    async fn uid(&self, msgno: u32) -> Result<u32> {
        Self::uid(self, msgno).await
    }

    async fn msgno(&self, uid: u32) -> Result<Option<u32>> {
        Self::msgno(self, uid).await
    }
}

use bytes::{Bytes, BytesMut};

/// Snapshot of the page a packet finished on.
///
/// Readers fill this from the page that carried the packet's last lacing
/// segment; writers fill it when the packet is buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    /// Logical stream serial number.
    pub sid: u32,
    /// Granule position of the page.
    pub granule_position: i64,
    /// Page sequence number within the logical stream.
    pub sequence_number: u32,
    /// Share of the page's header and lacing bytes attributed to the packet.
    pub overhead_bytes: usize,
}

/// A codec packet: the logical unit carried by Ogg pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    data: Bytes,
    bos: bool,
    eos: bool,
    page: Option<PageInfo>,
}

impl Packet {
    /// Create a packet for writing.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            bos: false,
            eos: false,
            page: None,
        }
    }

    pub(crate) fn from_page(data: Bytes, bos: bool, eos: bool, page: PageInfo) -> Self {
        Self {
            data,
            bos,
            eos,
            page: Some(page),
        }
    }

    /// The packet bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Consume the packet and return its bytes.
    pub fn into_data(self) -> Bytes {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_beginning_of_stream(&self) -> bool {
        self.bos
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.eos
    }

    pub fn set_beginning_of_stream(&mut self, bos: bool) {
        self.bos = bos;
    }

    pub fn set_end_of_stream(&mut self, eos: bool) {
        self.eos = eos;
    }

    /// Builder-style variant of [`Packet::set_end_of_stream`].
    pub fn with_end_of_stream(mut self) -> Self {
        self.eos = true;
        self
    }

    /// Page the packet finished on, if it has been read or buffered.
    pub fn page(&self) -> Option<&PageInfo> {
        self.page.as_ref()
    }

    pub fn set_page(&mut self, page: PageInfo) {
        self.page = Some(page);
    }

    /// Logical stream serial number, or `None` for an unbuffered packet.
    pub fn sid(&self) -> Option<u32> {
        self.page.map(|p| p.sid)
    }

    pub fn granule_position(&self) -> Option<i64> {
        self.page.map(|p| p.granule_position)
    }

    pub fn sequence_number(&self) -> Option<u32> {
        self.page.map(|p| p.sequence_number)
    }

    /// Approximate framing overhead attributable to this packet.
    ///
    /// Diagnostic only; the sum over a page's packets can differ from the
    /// real header size by rounding.
    pub fn overhead_bytes(&self) -> Option<usize> {
        self.page.map(|p| p.overhead_bytes)
    }
}

/// The head of a packet whose tail continues on a later page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketFragment {
    data: BytesMut,
    bos: bool,
}

impl PacketFragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether the packet started on a beginning-of-stream page.
    pub fn is_beginning_of_stream(&self) -> bool {
        self.bos
    }

    pub(crate) fn set_beginning_of_stream(&mut self, bos: bool) {
        self.bos = bos;
    }

    pub(crate) fn extend(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub(crate) fn into_bytes(self) -> Bytes {
        self.data.freeze()
    }
}

impl From<&[u8]> for PacketFragment {
    fn from(bytes: &[u8]) -> Self {
        Self {
            data: BytesMut::from(bytes),
            bos: false,
        }
    }
}

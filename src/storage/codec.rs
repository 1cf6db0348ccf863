const U8_SIZE: usize = std::mem::size_of::<u8>();
const U32_SIZE: usize = std::mem::size_of::<u32>();

/// Writes big-endian values into a fixed buffer, advancing a cursor.
pub(crate) struct Serializer<'a> {
    buffer: &'a mut [u8],
    pos: usize,
}

impl<'a> Serializer<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self { buffer, pos: 0 }
    }

    pub fn serialize_u8(&mut self, val: u8) {
        self.buffer[self.pos..self.pos + U8_SIZE].copy_from_slice(val.to_be_bytes().as_slice());
        self.pos += U8_SIZE;
    }

    pub fn serialize_u32(&mut self, val: u32) {
        self.buffer[self.pos..self.pos + U32_SIZE].copy_from_slice(val.to_be_bytes().as_slice());
        self.pos += U32_SIZE;
    }

    pub fn serialize_i32(&mut self, val: i32) {
        self.buffer[self.pos..self.pos + U32_SIZE].copy_from_slice(val.to_be_bytes().as_slice());
        self.pos += U32_SIZE;
    }

    pub fn copy_bytes(&mut self, bytes: &[u8]) {
        self.buffer[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    /// Writes `count` zero bytes
    pub fn zeroes(&mut self, count: usize) {
        self.buffer[self.pos..self.pos + count].fill(0);
        self.pos += count;
    }

    pub fn end(self) -> usize {
        self.pos
    }
}

/// Reads big-endian values from a buffer, advancing a cursor.
/// Callers size the buffer up front, reads never go past its end.
pub(crate) struct Deserializer<'a> {
    buffer: &'a [u8],
    pos: usize,
}

impl<'a> Deserializer<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, pos: 0 }
    }

    pub fn deserialize_u8(&mut self) -> u8 {
        let val = self.buffer[self.pos];
        self.pos += U8_SIZE;
        val
    }

    pub fn deserialize_u32(&mut self) -> u32 {
        let mut bytes = [0u8; U32_SIZE];
        bytes.copy_from_slice(&self.buffer[self.pos..self.pos + U32_SIZE]);
        self.pos += U32_SIZE;
        u32::from_be_bytes(bytes)
    }

    pub fn deserialize_i32(&mut self) -> i32 {
        let mut bytes = [0u8; U32_SIZE];
        bytes.copy_from_slice(&self.buffer[self.pos..self.pos + U32_SIZE]);
        self.pos += U32_SIZE;
        i32::from_be_bytes(bytes)
    }

    pub fn bytes(&mut self, count: usize) -> &'a [u8] {
        let slice = &self.buffer[self.pos..self.pos + count];
        self.pos += count;
        slice
    }

    pub fn pos(&self) -> usize {
        self.pos
    }
}

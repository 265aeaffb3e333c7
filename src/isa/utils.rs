pub struct ISABuilder<Desc: Clone> {
    instructions: Vec<Desc>,
}

impl<Desc: Clone> ISABuilder<Desc> {
    pub fn new() -> Self {
        ISABuilder {
            instructions: Vec::new(),
        }
    }

    pub fn add(mut self, desc: &[Desc]) -> Self {
        self.instructions.extend_from_slice(desc);
        self
    }

    pub fn build(self) -> Vec<Desc> {
        self.instructions
    }
}

#[macro_export]
macro_rules! define_instr_enum {
    ($isa_name:ident, $($name:ident),* $(,)?) => {
        #[allow(non_camel_case_types)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $isa_name {
            $($name),*
        }

        impl $isa_name {
            pub fn name(&self) -> &'static str {
                match self {
                    $($isa_name::$name => stringify!($name)),*
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeMask {
    pub key: u32,
    pub mask: u32,
}

impl DecodeMask {
    pub fn matches(&self, instr: u32) -> bool {
        (instr & self.mask) == self.key
    }
}

/// Build a mask from a pattern of `'0'`, `'1'` and `'?'`, most significant bit first.
/// Any other character is a separator.
pub const fn create_decode_mask(pattern: &'static str) -> DecodeMask {
    let bytes = pattern.as_bytes();
    let mut len = 0;
    let mut key = 0u32;
    let mut mask = 0u32;

    let mut i = 0;
    while i < bytes.len() {
        let ch = bytes[i];
        if ch == b'0' || ch == b'1' || ch == b'?' {
            len += 1;
            key = (key << 1) | (ch == b'1') as u32;
            mask = (mask << 1) | (ch != b'?') as u32;
        }
        i += 1;
    }

    assert!(len <= 32, "Pattern length exceeds 32 bits");
    assert!(len % 8 == 0, "Pattern length is not a multiple of 8");

    DecodeMask { key, mask }
}

use crate::error::StackError;

pub const DEFAULT_STACK_CAPACITY: usize = 256;

/// Fixed-capacity byte LIFO that grows downward from the last slot.
///
/// The whole buffer is usable: the first push lands on the top slot without
/// moving the pointer, every later push moves the pointer down first. Only the
/// pointer and an empty flag are tracked, so a full stack is one whose pointer
/// sits on slot 0 while not empty.
#[derive(Debug, Clone)]
pub struct Stack {
    data: Vec<u8>,
    sp: usize,
    empty: bool,
}

impl Stack {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Stack {
            data: vec![0; capacity],
            sp: capacity - 1,
            empty: true,
        }
    }

    pub fn reset(&mut self) {
        self.data.iter_mut().for_each(|b| *b = 0);
        self.sp = self.top_slot();
        self.empty = true;
    }

    pub fn push(&mut self, value: u8) -> Result<(), StackError> {
        if self.empty {
            self.data[self.sp] = value;
            self.empty = false;
            return Ok(());
        }

        if self.sp == 0 {
            return Err(StackError::Overflow);
        }

        self.sp -= 1;
        self.data[self.sp] = value;
        Ok(())
    }

    pub fn pop(&mut self) -> Result<u8, StackError> {
        if self.empty {
            return Err(StackError::Underflow);
        }

        let value = self.data[self.sp];
        if self.sp < self.top_slot() {
            self.sp += 1;
        } else {
            self.empty = true;
        }
        Ok(value)
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of bytes currently held, counting the top slot.
    pub fn len(&self) -> usize {
        if self.empty {
            0
        } else {
            self.capacity() - self.sp
        }
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn is_full(&self) -> bool {
        !self.empty && self.sp == 0
    }

    pub fn get_sp(&self) -> usize {
        self.sp
    }

    /// Most recently pushed byte.
    pub fn top(&self) -> Option<u8> {
        (!self.empty).then(|| self.data[self.sp])
    }

    /// First byte pushed since the stack was last empty.
    pub fn bottom(&self) -> Option<u8> {
        (!self.empty).then(|| self.data[self.top_slot()])
    }

    fn top_slot(&self) -> usize {
        self.data.len() - 1
    }
}

impl Default for Stack {
    fn default() -> Self {
        Stack::new(DEFAULT_STACK_CAPACITY)
    }
}

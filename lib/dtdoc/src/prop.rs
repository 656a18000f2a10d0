use alloc::{boxed::Box, vec, vec::Vec};
use core::str;

pub struct DocProp {
    pub name: Box<str>,
    pub data: Box<[u8]>,
}

impl DocProp {
    fn cell(&self, index: usize) -> Result<u32, PropError> {
        let start = index * 4;
        let bytes = self
            .data
            .get(start..start + 4)
            .ok_or(PropError::InvalidPropFormat)?;
        let mut word = [0u8; 4];
        word.copy_from_slice(bytes);
        Ok(u32::from_be_bytes(word))
    }

    pub fn cell_count(&self) -> usize {
        self.data.len() / 4
    }
}

impl DocProp {
    pub fn value_as_u32(&self) -> Result<u32, PropError> {
        self.cell(0)
    }
    pub fn value_as_u64(&self) -> Result<u64, PropError> {
        Ok(((self.cell(0)? as u64) << 32) | self.cell(1)? as u64)
    }
    pub fn value_as_cells(&self) -> Result<Vec<u32>, PropError> {
        if self.data.len() % 4 != 0 {
            return Err(PropError::InvalidPropFormat);
        }
        (0..self.cell_count()).map(|i| self.cell(i)).collect()
    }
    pub fn value_as_str(&self) -> Result<&str, PropError> {
        let s = str::from_utf8(&self.data).map_err(|_| PropError::InvalidPropFormat)?;
        Ok(s.trim_end_matches('\0'))
    }
    pub fn value_as_strlist(&self) -> Result<Vec<&str>, PropError> {
        let mut st = 0;
        let mut res = vec![];
        for i in 0..self.data.len() {
            if self.data[i] == 0 {
                let s = str::from_utf8(&self.data[st..i])
                    .map_err(|_| PropError::InvalidPropFormat)?;
                res.push(s);
                st = i + 1;
            }
        }
        if st != self.data.len() {
            // add last if not terminated with 0
            let s = str::from_utf8(&self.data[st..]).map_err(|_| PropError::InvalidPropFormat)?;
            res.push(s);
        }
        Ok(res)
    }
}

#[derive(Debug)]
pub enum PropError {
    InvalidPropFormat,
    PropNotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prop(data: &[u8]) -> DocProp {
        DocProp {
            name: Box::from("test"),
            data: Box::from(data),
        }
    }

    #[test]
    fn u32_reads_big_endian() {
        let p = prop(&[0x09, 0x00, 0x00, 0x01]);
        assert_eq!(p.value_as_u32().expect("u32"), 0x0900_0001);
    }

    #[test]
    fn u64_spans_two_cells() {
        let p = prop(&[0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02]);
        assert_eq!(p.value_as_u64().expect("u64"), 0x1_0000_0002);
    }

    #[test]
    fn short_data_is_rejected() {
        let p = prop(&[0x01, 0x02]);
        assert!(matches!(
            p.value_as_u32(),
            Err(PropError::InvalidPropFormat)
        ));
    }

    #[test]
    fn strlist_splits_on_nul() {
        let p = prop(b"ns16550a\0uart\0");
        assert_eq!(p.value_as_strlist().expect("strlist"), ["ns16550a", "uart"]);
    }

    #[test]
    fn strlist_keeps_unterminated_tail() {
        let p = prop(b"a\0b");
        assert_eq!(p.value_as_strlist().expect("strlist"), ["a", "b"]);
    }

    #[test]
    fn str_drops_trailing_nul() {
        let p = prop(b"timer\0");
        assert_eq!(p.value_as_str().expect("str"), "timer");
    }
}

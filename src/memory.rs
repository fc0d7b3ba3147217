macro_rules! grow_capacity {
    ($capacity:expr) => {{
        if $capacity < 8 {
            8
        } else {
            $capacity * 2
        }
    }};
}

pub(crate) use grow_capacity;

#[cfg(test)]
mod tests {
    #[test]
    fn test_grow_capacity() {
        assert_eq!(grow_capacity!(0usize), 8);
        assert_eq!(grow_capacity!(7usize), 8);
        assert_eq!(grow_capacity!(8usize), 16);
        assert_eq!(grow_capacity!(64usize), 128);
    }
}

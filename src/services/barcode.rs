use rand::Rng;

pub const DEFAULT_BARCODE_LENGTH: usize = 12;

/// Source of candidate barcodes. Output is not unique on its own; callers
/// check the store.
pub trait BarcodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct RandomBarcodeGenerator {
    length: usize,
}

impl RandomBarcodeGenerator {
    pub fn new(length: usize) -> Self {
        Self { length }
    }
}

impl Default for RandomBarcodeGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_BARCODE_LENGTH)
    }
}

impl BarcodeGenerator for RandomBarcodeGenerator {
    fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..self.length)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generates_fixed_length_digits() {
        let generator = RandomBarcodeGenerator::default();
        for _ in 0..100 {
            let code = generator.generate();
            assert_eq!(code.len(), DEFAULT_BARCODE_LENGTH);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_custom_length() {
        assert_eq!(RandomBarcodeGenerator::new(20).generate().len(), 20);
    }

    #[test]
    fn test_codes_vary() {
        let generator = RandomBarcodeGenerator::default();
        let codes: std::collections::HashSet<String> =
            (0..50).map(|_| generator.generate()).collect();
        assert!(codes.len() > 1);
    }
}

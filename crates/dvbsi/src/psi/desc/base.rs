//! 記述子に関する基礎の型。

use std::fmt;

use crate::psi::PsiError;
use crate::utils::BytesExt;

/// 記述子を表すトレイト。
pub trait Descriptor<'a>: Sized {
    /// この記述子のタグ。
    const TAG: u8;

    /// `data`から記述子を読み取る。
    ///
    /// `data`には`descriptor_tag`と`descriptor_length`は含まない。
    fn read(data: &'a [u8]) -> Result<Self, PsiError>;
}

/// パース前の記述子。
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RawDescriptor<'a> {
    /// 記述子のタグ。
    pub tag: u8,

    /// 記述子の内容。
    pub data: &'a [u8],
}

impl<'a> RawDescriptor<'a> {
    /// 内容を`T`として読み取る。
    ///
    /// タグが一致しない場合は`None`を返す。
    #[inline]
    pub fn parse<T: Descriptor<'a>>(&self) -> Option<Result<T, PsiError>> {
        (self.tag == T::TAG).then(|| T::read(self.data))
    }
}

impl<'a> fmt::Debug for RawDescriptor<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        struct PrintBytes<'a>(&'a [u8]);
        impl<'a> fmt::Debug for PrintBytes<'a> {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{} bytes", self.0.len())
            }
        }

        f.debug_struct("RawDescriptor")
            .field("tag", &crate::utils::UpperHex(self.tag))
            .field("data", &PrintBytes(self.data))
            .finish()
    }
}

/// 複数の記述子からなる記述子群。
///
/// 生成時に記述子ループ全体の長さを検証するため、反復は失敗しない。
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct DescriptorBlock<'a>(&'a [u8]);

impl DescriptorBlock<'static> {
    /// 空の記述子群。
    pub const EMPTY: DescriptorBlock<'static> = DescriptorBlock(&[]);
}

impl<'a> DescriptorBlock<'a> {
    /// `block`全体を記述子ループとして検証し、`DescriptorBlock`を生成する。
    ///
    /// 記述子の内容はパースせず、`get`メソッドで初めてパースする。
    ///
    /// 記述子が範囲を越える場合は[`PsiError::DescriptorTruncated`]を、
    /// 末尾に長さを持たない1バイトが残る場合は[`PsiError::LengthMismatch`]を返す。
    pub fn new(block: &'a [u8]) -> Result<DescriptorBlock<'a>, PsiError> {
        let mut data = block;
        loop {
            match *data {
                [] => break,
                [_] => {
                    log::debug!("invalid DescriptorBlock: trailing byte");
                    return Err(PsiError::LengthMismatch);
                }
                [tag, length, ref rem @ ..] => {
                    let Some((_, tail)) = rem.split_at_checked(length as usize) else {
                        log::debug!("invalid DescriptorBlock: descriptor 0x{:02X} overruns", tag);
                        return Err(PsiError::DescriptorTruncated);
                    };
                    data = tail;
                }
            }
        }

        Ok(DescriptorBlock(block))
    }

    /// `data`から`length`バイト分の記述子群を読み取り後続データと共に返す。
    ///
    /// データ長が不足している場合は[`PsiError::TruncatedData`]を返す。
    // `length`が`u16`なのは規格上`u16`以上の長さになることがなく、
    // 呼び出し側でのキャストが無意味であるため。
    pub fn read_with_len(
        data: &'a [u8],
        length: u16,
    ) -> Result<(DescriptorBlock<'a>, &'a [u8]), PsiError> {
        let (block, rem) = data
            .split_at_checked(length as usize)
            .ok_or(PsiError::TruncatedData)?;
        Ok((DescriptorBlock::new(block)?, rem))
    }

    /// `data`から予約4ビットと12ビットの長さで始まる記述子群を読み取り後続データと共に返す。
    #[inline]
    pub fn read(data: &'a [u8]) -> Result<(DescriptorBlock<'a>, &'a [u8]), PsiError> {
        if data.len() < 2 {
            return Err(PsiError::TruncatedData);
        }

        let length = data[0..=1].read_be_16() & 0b0000_1111_1111_1111;
        DescriptorBlock::read_with_len(&data[2..], length)
    }

    /// 記述子群のバイト列を返す。
    #[inline]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.0
    }

    /// 記述子群のバイト数を返す。
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// 記述子を1つも含まないかどうかを返す。
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 内包する記述子群のイテレーターを返す。
    #[inline]
    pub fn iter(&self) -> DescriptorIter<'a> {
        DescriptorIter(self.0)
    }

    /// 内包する記述子群から`T`のタグと一致する最初の記述子を読み取って返す。
    ///
    /// `T`のタグと一致する記述子がない場合は`Ok(None)`を返す。
    pub fn get<T: Descriptor<'a>>(&self) -> Result<Option<T>, PsiError> {
        self.iter()
            .find(|d| d.tag == T::TAG)
            .map(|d| T::read(d.data))
            .transpose()
    }

    /// 内包する記述子群から`T`のタグと一致する記述子をすべて読み取って返す。
    pub fn get_all<T: Descriptor<'a>>(&self) -> impl Iterator<Item = Result<T, PsiError>> + 'a {
        self.iter().filter_map(|d| d.parse::<T>())
    }
}

impl<'a> fmt::Debug for DescriptorBlock<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("DescriptorBlock(")?;
        f.debug_list().entries(self).finish()?;
        f.write_str(")")
    }
}

impl<'a> IntoIterator for &DescriptorBlock<'a> {
    type Item = RawDescriptor<'a>;
    type IntoIter = DescriptorIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// [`DescriptorBlock`]のイテレーター。
#[derive(Clone)]
pub struct DescriptorIter<'a>(&'a [u8]);

impl<'a> Iterator for DescriptorIter<'a> {
    type Item = RawDescriptor<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let [tag, length, ref rem @ ..] = *self.0 else {
            return None;
        };
        let (data, tail) = rem.split_at_checked(length as usize)?;

        self.0 = tail;
        Some(RawDescriptor { tag, data })
    }
}

impl<'a> std::iter::FusedIterator for DescriptorIter<'a> {}

impl<'a> fmt::Debug for DescriptorIter<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DescriptorIter(")?;
        f.debug_list().entries(self.clone()).finish()?;
        f.write_str(")")
    }
}

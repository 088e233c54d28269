
//! Groups the channels of a part by how they are compressed.
//! Red, green and blue channels of a common layer are converted
//! to luminance and chroma before the frequency transform.

use crate::meta::attribute::{ChannelList, SampleType};


/// The outcome of classifying a channel list.
/// Index values refer to positions in the alphabetically sorted channel list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {

    /// Triples of (red, green, blue) channel indices
    /// that are color-converted and frequency-transformed together.
    pub csc_groups: Vec<[usize; 3]>,

    /// Half float channels that are frequency-transformed on their own.
    pub solo_dct: Vec<usize>,

    /// Channels that cannot be frequency-transformed and
    /// fall back to prediction and run length coding.
    pub raw: Vec<usize>,
}


/// Decide how each channel of the list is compressed.
/// Both the compressing and the decompressing side derive
/// the identical classification from the channel list alone.
pub fn classify(channels: &ChannelList) -> Classification {
    let mut classification = Classification::default();
    let mut grouped = vec![false; channels.list.len()];

    // find complete r/g/b triples within each layer
    for (index, channel) in channels.list.iter().enumerate() {
        if channel.sample_type != SampleType::F16 { continue; }
        if !suffix_matches(channel.name.as_slice(), b"r") { continue; }

        let layer = layer_of(channel.name.as_slice());

        let green = channels.list.iter().position(|other|
            other.sample_type == SampleType::F16
                && other.sampling == channel.sampling
                && layer_of(other.name.as_slice()) == layer
                && suffix_matches(other.name.as_slice(), b"g"));

        let blue = channels.list.iter().position(|other|
            other.sample_type == SampleType::F16
                && other.sampling == channel.sampling
                && layer_of(other.name.as_slice()) == layer
                && suffix_matches(other.name.as_slice(), b"b"));

        if let (Some(green), Some(blue)) = (green, blue) {
            classification.csc_groups.push([index, green, blue]);
            grouped[index] = true;
            grouped[green] = true;
            grouped[blue] = true;
        }
    }

    for (index, channel) in channels.list.iter().enumerate() {
        if grouped[index] { continue; }

        if channel.sample_type == SampleType::F16 {
            classification.solo_dct.push(index);
        }
        else {
            classification.raw.push(index);
        }
    }

    classification
}


/// The layer prefix of a channel name, up to and including the last period.
fn layer_of(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|&byte| byte == b'.') {
        Some(last_period) => &name[..= last_period],
        None => &[],
    }
}

/// Whether the channel base name equals the suffix, ignoring case.
fn suffix_matches(name: &[u8], suffix: &[u8]) -> bool {
    let base = match name.iter().rposition(|&byte| byte == b'.') {
        Some(last_period) => &name[last_period + 1 ..],
        None => name,
    };

    base.eq_ignore_ascii_case(suffix)
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::attribute::{ChannelDescription, Text};
    use smallvec::smallvec;

    fn list(names_and_types: &[(&str, SampleType)]) -> ChannelList {
        ChannelList::new(names_and_types.iter()
            .map(|&(name, sample_type)| ChannelDescription::new(Text::new_or_panic(name), sample_type, false))
            .collect())
    }

    #[test]
    fn rgb_is_grouped(){
        let channels = list(&[
            ("R", SampleType::F16),
            ("G", SampleType::F16),
            ("B", SampleType::F16),
            ("A", SampleType::F16),
            ("Z", SampleType::F32),
        ]);

        let classification = classify(&channels);

        // channels are sorted: A B G R Z
        assert_eq!(classification.csc_groups, vec![[3, 2, 1]]);
        assert_eq!(classification.solo_dct, vec![0]);
        assert_eq!(classification.raw, vec![4]);
    }

    #[test]
    fn layers_are_grouped_separately(){
        let channels = list(&[
            ("diffuse.R", SampleType::F16),
            ("diffuse.G", SampleType::F16),
            ("diffuse.B", SampleType::F16),
            ("specular.R", SampleType::F16),
            ("specular.G", SampleType::F16),
        ]);

        let classification = classify(&channels);

        // the specular layer misses its blue channel and stays ungrouped
        assert_eq!(classification.csc_groups.len(), 1);
        assert_eq!(classification.solo_dct.len(), 2);
        assert!(classification.raw.is_empty());
    }

    #[test]
    fn float_rgb_is_not_converted(){
        let channels = list(&[
            ("R", SampleType::F32),
            ("G", SampleType::F32),
            ("B", SampleType::F32),
        ]);

        let classification = classify(&channels);
        assert!(classification.csc_groups.is_empty());
        assert_eq!(classification.raw.len(), 3);
    }

    #[test]
    fn every_channel_is_classified_exactly_once(){
        let channels = list(&[
            ("R", SampleType::F16),
            ("G", SampleType::F16),
            ("B", SampleType::F16),
            ("depth.Z", SampleType::F32),
            ("id", SampleType::U32),
            ("Y", SampleType::F16),
        ]);

        let classification = classify(&channels);

        let mut count = vec![0; channels.list.len()];
        for group in &classification.csc_groups {
            for &index in group { count[index] += 1; }
        }

        for &index in classification.solo_dct.iter().chain(&classification.raw) {
            count[index] += 1;
        }

        assert!(count.iter().all(|&channel_count| channel_count == 1));
    }
}

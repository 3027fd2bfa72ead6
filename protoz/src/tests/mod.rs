//! Cross-module tests driving the message façade.

mod codec_tests;
mod collection_tests;

use crate::descriptor::{
    DescriptorPool, DescriptorType, EnumBuilder, FieldSpec, MessageBuilder, MessageDescriptor,
};

/// Pool with one message exercising every field shape.
pub(crate) fn sample_pool() -> DescriptorPool {
    DescriptorPool::builder()
        .message(
            MessageBuilder::new("test.Sample")
                .field(FieldSpec::scalar("count", 1, DescriptorType::Int32))
                .field(FieldSpec::scalar("name", 2, DescriptorType::String))
                .field(FieldSpec::scalar("data", 3, DescriptorType::Bytes))
                .field(FieldSpec::scalar("ratio", 4, DescriptorType::Float))
                .field(FieldSpec::message("child", 5, "Sample"))
                .field(FieldSpec::scalar("tags", 6, DescriptorType::String).repeated())
                .field(FieldSpec::map(
                    "scores",
                    7,
                    DescriptorType::String,
                    DescriptorType::Int32,
                ))
                .field(FieldSpec::message("kids", 8, "Sample").repeated())
                .field(FieldSpec::enumeration("color", 9, "Color"))
                .oneof(
                    "choice",
                    [
                        FieldSpec::scalar("text", 10, DescriptorType::String),
                        FieldSpec::scalar("number", 11, DescriptorType::Int64),
                        FieldSpec::message("sub", 12, "Sample"),
                    ],
                )
                .field(FieldSpec::scalar("opt", 13, DescriptorType::Int32).optional())
                .field(FieldSpec::message("wrapped", 14, "Int32Value"))
                .field(FieldSpec::map_to(
                    "children",
                    15,
                    DescriptorType::Int32,
                    DescriptorType::Message,
                    "Sample",
                ))
                .field(FieldSpec::enumeration("level", 16, "Level"))
                .field(FieldSpec::scalar("big", 17, DescriptorType::Uint64)),
        )
        .message(
            MessageBuilder::new("test.Int32Value")
                .field(FieldSpec::scalar("value", 1, DescriptorType::Int32)),
        )
        .message(
            MessageBuilder::new("test.Other")
                .field(FieldSpec::scalar("count", 1, DescriptorType::Int32)),
        )
        .enumeration(
            EnumBuilder::new("test.Color")
                .value("RED", 0)
                .value("GREEN", 1)
                .value("BLUE", 2),
        )
        .enumeration(
            EnumBuilder::new("test.Level")
                .value("LOW", 0)
                .value("HIGH", 2)
                .closed(true),
        )
        .build()
        .unwrap()
}

pub(crate) fn sample() -> MessageDescriptor {
    sample_pool().message("test.Sample").unwrap()
}
